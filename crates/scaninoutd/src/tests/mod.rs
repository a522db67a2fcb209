//! Behavioural suites for the daemon.

mod bootstrap_behaviour;
mod dispatch_behaviour;
mod support;
