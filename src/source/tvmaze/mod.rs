mod provider;

pub use provider::TvMazeClient;

/// Default API root
pub const TVMAZE_BASE_URL: &str = "https://api.tvmaze.com";
