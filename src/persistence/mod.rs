//! Persisted state (spec §6): INI key/value files and little-endian binary
//! files with null-terminated strings. Neither format has a close enough
//! match in the example pack's dependency set to justify pulling in a crate
//! for it, so both are hand-rolled, narrowly, to exactly what the intrinsic
//! vocabulary needs.

pub mod binfile;
pub mod ini;
