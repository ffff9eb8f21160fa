pub(crate) mod hashing;
pub(crate) mod parallel;
mod secret;
pub(crate) mod sss;

pub(crate) use secret::Secret;
