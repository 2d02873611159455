// ============================================================================
// Bridge Types - Core Data Types
// ============================================================================
//
// Data structures shared by the cloud service and the on-prem agent. No
// business logic, storage or network code lives here.
//
// Contents:
// - Location identifiers (cloud and on-prem parties)
// - Plain bus messages and the origin header
// - Wire DTOs for registration, rotation and the message queue
// - Reserved status codes, header names and route paths
//
// ============================================================================

pub mod location_id;
pub mod message;
pub mod wire;

pub use location_id::*;
pub use message::*;
pub use wire::*;
