//! Request authorization: public-call classification, bearer-token
//! validation and the gateway that composes them.

pub mod classifier;
pub mod gateway;
pub mod middleware;
pub mod token;
