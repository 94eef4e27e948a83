pub mod cell_marking;
pub mod decay_fit;
pub mod density_ratio;
pub mod grid_partition;
pub mod labeling;
pub mod neighbour_filter;
pub mod recording_summary;
pub mod square;
pub mod square_metrics;
pub mod threshold_selector;
pub mod track;
pub mod utils;
