pub mod heuristic;
pub mod ordered_heuristic;
pub mod random_heuristic;
pub mod ron_path;
