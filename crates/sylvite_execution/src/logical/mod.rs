pub mod logical_filter;
pub mod logical_join;
pub mod logical_scan;
pub mod logical_show_tables;
pub mod operator;
