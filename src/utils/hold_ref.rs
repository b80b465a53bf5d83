// utils/hold_ref.rs
use rand::Rng;

pub const HOLD_REF_PREFIX: &str = "EHR-";
pub const HOLD_REF_LEN: usize = 12;
pub const MAX_HOLD_REF_ATTEMPTS: usize = 20;

const HOLD_REF_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub fn generate_hold_ref() -> String {
    let mut rng = rand::rng();
    let body: String = (0..HOLD_REF_LEN)
        .map(|_| HOLD_REF_CHARSET[rng.random_range(0..HOLD_REF_CHARSET.len())] as char)
        .collect();
    format!("{HOLD_REF_PREFIX}{body}")
}

/// Used once every random candidate collided: the last candidate with the
/// last four digits of the unix time appended.
pub fn fallback_hold_ref(candidate: &str, unix_secs: i64) -> String {
    format!("{}{:04}", candidate, unix_secs.rem_euclid(10_000))
}

#[cfg(test)]
pub fn is_well_formed(hold_ref: &str) -> bool {
    hold_ref
        .strip_prefix(HOLD_REF_PREFIX)
        .map_or(false, |body| {
            body.len() == HOLD_REF_LEN
                && body.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        })
}
