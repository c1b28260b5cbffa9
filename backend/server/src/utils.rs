use chrono::{DateTime, Utc};

/// Session identifiers are 32 random bytes, hex encoded.
pub const SESSION_ID_BYTES: usize = 32;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn generate(&self) -> String {
        let bytes: [u8; SESSION_ID_BYTES] = rand::random();

        hex::encode(bytes)
    }
}

/// Cookie values that could not have come from [`RandomIds`] never reach the stores.
pub fn is_well_formed_session_id(raw: &str) -> bool {
    raw.len() == SESSION_ID_BYTES * 2
        && raw
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
