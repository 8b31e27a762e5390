//! Update core test suite, driven by scripted transports.

mod support;
