//! Tower middleware used inside the transport.

pub(crate) mod timeout;

pub(crate) use self::timeout::TimeoutLayer;
