pub mod time_zone;
