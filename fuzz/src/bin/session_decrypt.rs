#[macro_use]
extern crate afl;
use olm_session::{Account, MessageType, OlmMessage, Session};

fn get_session() -> Session {
    // The Victim
    let alice = Account::new().expect("Setup failed");

    // The Attacker context
    let mut bob = Account::new().expect("Setup failed");
    bob.generate_one_time_keys(1).expect("Setup failed");
    let one_time_key = bob
        .one_time_keys()
        .curve25519
        .into_values()
        .next()
        .expect("Setup failed");

    alice
        .create_outbound_session(&bob.identity_keys().curve25519, &one_time_key)
        .expect("Setup failed")
}

fn main() {
    let mut session = get_session();

    fuzz!(|data: &[u8]| {
        let Some((&kind, rest)) = data.split_first() else {
            return;
        };
        let message_type = if kind & 1 == 0 {
            MessageType::PreKey
        } else {
            MessageType::Normal
        };

        if let Ok(ciphertext) = std::str::from_utf8(rest) {
            let _ = session.decrypt(&OlmMessage::new(message_type, ciphertext));
        }
    });
}
