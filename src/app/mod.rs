pub mod ports;
pub mod lookup;
pub mod scrape_use_case;
pub mod extract_use_case;
pub mod identify_use_case;
pub mod export_use_case;
