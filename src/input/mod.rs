pub mod parse;
pub mod provision_request;
