//! # Formats
//!
//! Persisted representations of module subtrees. File I/O lives in
//! [`crate::storage`]; this module only converts between trees and text.

pub mod xml;

pub use xml::{ConnectionPolicy, module_from_xml, module_to_xml, uid_from_header};
