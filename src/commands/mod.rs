pub mod journal;
pub mod replay;
