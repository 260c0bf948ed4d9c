pub mod fetcher;

pub use fetcher::FeedFetcher;
