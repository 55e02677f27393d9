//! This module contains the eviction machinery: the task slot that admits one
//! pass at a time, and the pass itself.

pub(crate) mod gate;
pub(crate) mod pass;
