pub mod hash;
pub mod song;
