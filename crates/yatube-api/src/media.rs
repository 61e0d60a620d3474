use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

use crate::forms::ValidImage;

/// Uploaded post images live under `{root}/posts/`.
const POST_IMAGE_DIR: &str = "posts";

/// On-disk store for uploaded files. Paths handed back are relative to the
/// root so they can be served under the media URL.
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub async fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(root.join(POST_IMAGE_DIR)).await?;
        info!("Media directory: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Writes an image under a fresh name and returns its relative path.
    pub async fn save_post_image(&self, image: &ValidImage) -> Result<String> {
        let relative = format!("{}/{}.{}", POST_IMAGE_DIR, Uuid::new_v4(), image.extension);
        fs::write(self.path_of(&relative), &image.bytes).await?;
        info!("Stored image {} ({} bytes)", relative, image.bytes.len());
        Ok(relative)
    }

    /// Deletes a stored file by its relative path.
    pub async fn delete(&self, relative: &str) -> Result<()> {
        match fs::remove_file(self.path_of(relative)).await {
            Ok(()) => {
                info!("Deleted {}", relative);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("{} already gone", relative);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
