//! Emission of rebased assets once the bundle has been written.

pub mod materialize;
pub mod styles;
