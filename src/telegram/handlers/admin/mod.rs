//! Admin endpoints. Capability enforcement happens in the gate's permission
//! stage; by the time these run the caller is authorized.

pub mod broadcast;
pub mod channels;
pub mod delete;
pub mod stats;
pub mod upload;
pub mod users;
