//! Gateway behaviour observed from the bus side.

mod cluster;
mod scenarios;
