//! Core engine — wager placement, round settlement, and reporting views.

pub mod ranking;
pub mod settlement;
pub mod wager;
