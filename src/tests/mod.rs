pub mod common;

mod hoist;
