//! Behavioural tests for channel routing and requests.

mod support;
