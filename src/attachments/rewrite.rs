//! Download URL rewriting
//!
//! CDN attachment URLs are served through the media proxy host instead, with
//! size/quality parameters removed. Animated images the platform stores as
//! video are requested as their video variant.

use crate::config::AttachmentConfig;
use crate::error::AttachmentError;
use url::Url;

/// Compute the URL an attachment is actually downloaded from
///
/// URLs on other hosts are returned unchanged apart from the video rewrite.
pub fn rewrite_download_url(
    origin: &str,
    filename: &str,
    config: &AttachmentConfig,
) -> Result<String, AttachmentError> {
    let mut url = Url::parse(origin).map_err(|_| AttachmentError::InvalidUrl {
        url: origin.to_string(),
    })?;

    let on_platform = url
        .host_str()
        .is_some_and(|h| h == config.cdn_host || h == config.media_proxy_host);

    if on_platform {
        url.set_host(Some(&config.media_proxy_host))
            .map_err(|_| AttachmentError::InvalidUrl {
                url: origin.to_string(),
            })?;

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !config.stripped_params.iter().any(|p| p == k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    if is_video_gif(filename, config) {
        let path = url.path().to_string();
        if let Some((stem, ext)) = path.rsplit_once('.')
            && is_known_video_gif_ext(ext, config)
        {
            url.set_path(&format!("{}.mp4", stem));
        }
    }

    Ok(url.to_string())
}

/// Whether `filename` names an animated image the platform serves as video
pub fn is_video_gif(filename: &str, config: &AttachmentConfig) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| is_known_video_gif_ext(ext, config))
}

fn is_known_video_gif_ext(ext: &str, config: &AttachmentConfig) -> bool {
    config
        .video_gif_extensions
        .iter()
        .any(|known| known.eq_ignore_ascii_case(ext))
}
