pub mod coordinator;
pub mod engine;
pub mod product_search;
pub mod static_search;

pub use coordinator::SearchCoordinator;
pub use engine::{search_object, SearchEngine};
pub use product_search::ProductSearchClient;
pub use static_search::StaticImageSearch;
