#[macro_use]
extern crate afl;
use olm_session::{Account, Session};

fn get_session() -> Session {
    let alice = Account::new().expect("Setup failed");
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
    let account = Account::new().expect("Setup failed");
    let session = get_session();

    fuzz!(|data: &[u8]| {
        if let Ok(message) = std::str::from_utf8(data) {
            let _ = account.create_inbound_session(message);
            let _ = session.matches_inbound(message);
        }
    });
}
