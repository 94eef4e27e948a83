pub mod image_helper;
pub mod numeric;
pub mod square_table;
pub mod track_table;
