//! Docker Engine API implementation of [`ImageEngine`].

use std::path::Path;

use bollard::Docker;
use bollard::container::{
  Config, CreateContainerOptions, DownloadFromContainerOptions, RemoveContainerOptions,
};
use bollard::image::{BuildImageOptions, PushImageOptions, TagImageOptions};
use bollard::models::{BuildInfo, PushImageInfo};
use futures_util::StreamExt;
use tracing::{debug, warn};

use super::{ByteStream, EngineError, ImageEngine, PushEvent, PushStream, context};

/// Client for a local Docker daemon.
pub struct DockerEngine {
  docker: Docker,
}

impl DockerEngine {
  /// Connect using the daemon's local defaults (unix socket or npipe).
  pub fn connect() -> Result<Self, EngineError> {
    let docker = Docker::connect_with_local_defaults()?;
    Ok(Self { docker })
  }

  async fn run_build(&self, tarball: Vec<u8>, dockerfile: &str) -> Result<String, EngineError> {
    let options = BuildImageOptions::<String> {
      dockerfile: dockerfile.to_string(),
      rm: true,
      ..Default::default()
    };

    let mut stream = self.docker.build_image(options, None, Some(tarball.into()));
    let mut image_id = None;
    while let Some(item) = stream.next().await {
      let info = item?;
      if let Some(message) = build_error_message(&info) {
        return Err(EngineError::Build(message));
      }
      if let Some(text) = &info.stream {
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
          debug!("{}", line);
        }
      }
      if let Some(id) = info.aux.and_then(|aux| aux.id) {
        image_id = Some(id);
      }
    }

    image_id.ok_or_else(|| EngineError::Build("daemon did not report an image id".to_string()))
  }
}

fn build_error_message(info: &BuildInfo) -> Option<String> {
  info
    .error_detail
    .as_ref()
    .and_then(|detail| detail.message.clone())
    .or_else(|| info.error.clone())
}

fn push_event(info: PushImageInfo) -> PushEvent {
  let error_detail = info.error;
  let message = match (info.status, info.progress) {
    (Some(status), Some(progress)) => Some(format!("{status} {progress}")),
    (Some(status), None) => Some(status),
    (None, progress) => progress,
  };
  PushEvent { message, error_detail }
}

impl ImageEngine for DockerEngine {
  async fn build(&self, context_dir: &Path, dockerfile: &str) -> Result<String, EngineError> {
    let tarball = context::pack_context(context_dir, dockerfile)?;
    debug!(
      context = %context_dir.display(),
      bytes = tarball.len(),
      "uploading build context"
    );
    self.run_build(tarball, dockerfile).await
  }

  async fn build_inline(&self, dockerfile: &str) -> Result<String, EngineError> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(dockerfile.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, "Dockerfile", dockerfile.as_bytes())?;
    let tarball = builder.into_inner()?;
    self.run_build(tarball, "Dockerfile").await
  }

  async fn tag(&self, image: &str, repo: &str, tag: &str) -> Result<(), EngineError> {
    let options = TagImageOptions {
      repo: repo.to_string(),
      tag: tag.to_string(),
    };
    self.docker.tag_image(image, Some(options)).await?;
    Ok(())
  }

  async fn push(&self, repo: &str, tag: &str) -> Result<PushStream<'_>, EngineError> {
    let options = PushImageOptions { tag: tag.to_string() };
    let stream = self.docker.push_image(repo, Some(options), None);
    Ok(Box::pin(stream.map(|item| {
      item.map(push_event).map_err(EngineError::from)
    })))
  }

  async fn create_container(&self, image: &str) -> Result<String, EngineError> {
    let config = Config::<String> {
      image: Some(image.to_string()),
      ..Default::default()
    };
    let response = self
      .docker
      .create_container(Option::<CreateContainerOptions<String>>::None, config)
      .await?;
    for warning in &response.warnings {
      warn!(image = image, "{}", warning);
    }
    Ok(response.id)
  }

  async fn export_path(&self, container: &str, path: &str) -> Result<ByteStream<'_>, EngineError> {
    let options = DownloadFromContainerOptions { path: path.to_string() };
    let stream = self.docker.download_from_container(container, Some(options));
    Ok(Box::pin(stream.map(|item| item.map_err(EngineError::from))))
  }

  async fn remove_container(&self, container: &str) -> Result<(), EngineError> {
    let options = RemoveContainerOptions {
      force: true,
      ..Default::default()
    };
    self.docker.remove_container(container, Some(options)).await?;
    Ok(())
  }
}
