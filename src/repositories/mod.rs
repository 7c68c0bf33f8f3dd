// Module declarations
pub mod sqlite; // Trait definitions live next to their sqlite implementations.
