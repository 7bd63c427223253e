pub mod key_listing;
