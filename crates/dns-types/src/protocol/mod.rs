//! The DNS wire protocol: message, question, and resource record types,
//! plus serialisation to and deserialisation from the wire format.

pub mod deserialise;
pub mod serialise;
pub mod types;
