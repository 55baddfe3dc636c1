//! Sealed-trait marker, used to keep the object-safe facade traits in
//! [`crate::observability`] implementable only from within this workspace
//! while still letting downstream crates hold `Arc<dyn Trait>` values.

pub trait Sealed {}
