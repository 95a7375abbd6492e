//! Per-vehicle profile definitions, one module per vehicle family.

pub mod ford;
