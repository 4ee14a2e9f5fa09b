use edge_config::SystemConfig;
use url::Url;

use crate::ImageError;

pub const MAX_IMAGE_URL_LENGTH: usize = 3072;

/// Hostnames permitted as external image sources. Membership is an exact,
/// ASCII-case-insensitive hostname comparison; ports never take part.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ImageDomainAllowlist {
    domains: Vec<String>,
}

impl ImageDomainAllowlist {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list: Vec<String> = Vec::new();
        for domain in domains {
            let domain = domain.as_ref().trim().to_ascii_lowercase();
            if !domain.is_empty() && !list.contains(&domain) {
                list.push(domain);
            }
        }
        Self { domains: list }
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn contains(&self, host: &str) -> bool {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        self.domains
            .iter()
            .any(|domain| domain.eq_ignore_ascii_case(host))
    }

    pub fn permits(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
            && url.host_str().is_some_and(|host| self.contains(host))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImageSource {
    Remote(Url),
    /// Same-origin path (with optional query) resolved through the rewrite table.
    Local(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageRequest {
    pub source: ImageSource,
    pub width: u32,
    pub quality: u8,
}

#[derive(Clone, Debug)]
pub struct ImagePolicy {
    pub allowlist: ImageDomainAllowlist,
    pub device_sizes: Vec<u32>,
    pub image_sizes: Vec<u32>,
    pub dangerously_allow_svg: bool,
}

impl Default for ImagePolicy {
    fn default() -> Self {
        Self::from_config(&SystemConfig::default())
    }
}

impl ImagePolicy {
    pub fn from_config(config: &SystemConfig) -> Self {
        let sizes = |key: &str| -> Vec<u32> {
            config
                .get_number_list(key)
                .into_iter()
                .filter_map(|size| u32::try_from(size).ok())
                .collect()
        };
        Self {
            allowlist: ImageDomainAllowlist::new(config.get_list("images.domains")),
            device_sizes: sizes("images.device_sizes"),
            image_sizes: sizes("images.image_sizes"),
            dangerously_allow_svg: config.get_bool("images.dangerously_allow_svg"),
        }
    }

    pub fn allows_width(&self, width: u32) -> bool {
        self.device_sizes.contains(&width) || self.image_sizes.contains(&width)
    }

    /// Validates the `url`, `w` and `q` parameters of an image request.
    pub fn parse_request(&self, query: Option<&str>) -> Result<ImageRequest, ImageError> {
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.unwrap_or("").as_bytes())
            .into_owned()
            .collect();
        let raw_url = single_param(&pairs, "url")?
            .filter(|value| !value.is_empty())
            .ok_or_else(|| bad_request("\"url\" parameter is required"))?;
        if raw_url.len() > MAX_IMAGE_URL_LENGTH {
            return Err(bad_request("\"url\" parameter is too long"));
        }
        if raw_url.starts_with("//") {
            return Err(bad_request(
                "\"url\" parameter cannot be a protocol-relative URL (//)",
            ));
        }
        let source = if raw_url.starts_with('/') {
            ImageSource::Local(raw_url.to_string())
        } else {
            let url = Url::parse(raw_url).map_err(|_| bad_request("\"url\" parameter is invalid"))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(bad_request("\"url\" parameter is invalid"));
            }
            if !self.allowlist.permits(&url) {
                return Err(bad_request("\"url\" parameter is not allowed"));
            }
            ImageSource::Remote(url)
        };

        let raw_width = single_param(&pairs, "w")?.ok_or_else(|| bad_request("\"w\" parameter (width) is required"))?;
        let width = raw_width
            .parse::<u32>()
            .ok()
            .filter(|width| *width > 0)
            .ok_or_else(|| bad_request("\"w\" parameter (width) must be an integer greater than 0"))?;
        if !self.allows_width(width) {
            return Err(bad_request(format!(
                "\"w\" parameter (width) of {width} is not allowed"
            )));
        }

        let raw_quality =
            single_param(&pairs, "q")?.ok_or_else(|| bad_request("\"q\" parameter (quality) is required"))?;
        let quality = raw_quality
            .parse::<u8>()
            .ok()
            .filter(|quality| (1..=100).contains(quality))
            .ok_or_else(|| {
                bad_request("\"q\" parameter (quality) must be an integer between 1 and 100")
            })?;

        Ok(ImageRequest {
            source,
            width,
            quality,
        })
    }

    /// Checks the upstream `content-type` before an image is relayed.
    pub fn check_content_type(&self, content_type: Option<&str>) -> Result<String, ImageError> {
        let content_type = content_type
            .map(|value| value.trim().to_ascii_lowercase())
            .unwrap_or_default();
        let essence = content_type.split(';').next().unwrap_or("").trim().to_string();
        if !essence.starts_with("image/") {
            return Err(bad_request("The requested resource isn't a valid image."));
        }
        if essence == "image/svg+xml" && !self.dangerously_allow_svg {
            return Err(bad_request(
                "The requested resource is an SVG, but SVG images are disabled.",
            ));
        }
        Ok(essence)
    }
}

fn single_param<'a>(
    pairs: &'a [(String, String)],
    key: &str,
) -> Result<Option<&'a str>, ImageError> {
    let mut values = pairs.iter().filter(|(name, _)| name == key);
    let first = values.next().map(|(_, value)| value.as_str());
    if values.next().is_some() {
        return Err(bad_request(format!("\"{key}\" parameter cannot be an array")));
    }
    Ok(first)
}

fn bad_request(message: impl Into<String>) -> ImageError {
    ImageError::BadRequest(message.into())
}
