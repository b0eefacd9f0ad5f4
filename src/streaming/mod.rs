pub mod range;
pub mod responder;
