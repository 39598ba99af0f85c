//! Shared record contracts between the labplan engine and its table
//! collaborators.

pub mod fields;
pub mod records;

pub use fields::{FieldError, FieldMap};
pub use records::{
    ControlEntry, InstrumentDescriptor, LibraryKind, LibraryRecord, SampleRecord, SpeciesEntry,
    SpeciesInfo, SpeciesSpec, UnitDescriptor,
};
