mod provider;

pub use provider::TvdbClient;

/// Default API root
pub const TVDB_BASE_URL: &str = "https://api.thetvdb.com";
/// Root for relative artwork paths
pub const TVDB_ARTWORK_BASE: &str = "https://artworks.thetvdb.com/banners/";
