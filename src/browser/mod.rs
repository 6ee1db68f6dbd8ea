pub mod advancer;
pub mod chrome;
pub mod navigation;

pub use advancer::ListingAdvancer;
pub use chrome::ChromeEnvironment;
pub use navigation::wait_for_page_load;
