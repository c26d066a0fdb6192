/// Limits applied to every session an account creates.
///
/// The config travels with each session, and both account and session
/// pickles carry it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountConfig {
    /// Message keys cached for out-of-order delivery, across all receiver
    /// chains. The oldest key is dropped first.
    pub max_skipped_message_keys: usize,
    /// Largest jump ahead in a single receiver chain that a message may ask for.
    pub max_message_gap: u32,
    /// Receiver chains remembered per session. The oldest chain is dropped first.
    pub max_receiver_chains: usize,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            max_skipped_message_keys: 40,
            max_message_gap: 2000,
            max_receiver_chains: 5,
        }
    }
}
