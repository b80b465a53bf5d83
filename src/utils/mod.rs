pub mod currency;
pub mod hold_ref;
pub mod token;
