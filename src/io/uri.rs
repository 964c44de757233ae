use anyhow::{Result, anyhow};
use std::path::PathBuf;
use url::Url;

/// Represents a parsed dataset location
#[derive(Debug, Clone, PartialEq)]
pub enum SourceUri {
    Local(PathBuf),
    Http(Url),
}

impl SourceUri {
    /// Parse a URI string into a SourceUri
    pub fn parse(uri: &str) -> Result<Self> {
        // Try parsing as URL first
        if let Ok(url) = Url::parse(uri) {
            match url.scheme() {
                "http" | "https" => {
                    if url.host_str().is_none() {
                        return Err(anyhow!("HTTP URI missing host: {}", uri));
                    }
                    Ok(SourceUri::Http(url))
                }
                "file" => {
                    let path = url
                        .to_file_path()
                        .map_err(|_| anyhow!("Invalid file:// URI: {}", uri))?;
                    Ok(SourceUri::Local(path))
                }
                // Windows drive letters parse as a one-letter scheme
                scheme if scheme.len() == 1 => Ok(SourceUri::Local(PathBuf::from(uri))),
                scheme => Err(anyhow!("Unsupported URI scheme: {}", scheme)),
            }
        } else {
            // Treat as local file path
            Ok(SourceUri::Local(PathBuf::from(uri)))
        }
    }
}
