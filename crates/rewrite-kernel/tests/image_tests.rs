use edge_config::SystemConfigLoader;
use rewrite_kernel::{ImageDomainAllowlist, ImageError, ImagePolicy, ImageSource};
use url::Url;

fn policy() -> ImagePolicy {
    ImagePolicy::default()
}

fn message(err: ImageError) -> String {
    match err {
        ImageError::BadRequest(message) => message,
        other => panic!("expected bad request, got {other:?}"),
    }
}

#[test]
fn allowlist_accepts_only_configured_host() {
    let allowlist = ImageDomainAllowlist::new(["172.17.0.2"]);
    assert!(allowlist.permits(&Url::parse("http://172.17.0.2:5000/maps/west.png").expect("url")));
    assert!(allowlist.permits(&Url::parse("https://172.17.0.2/logo.svg").expect("url")));
    assert!(!allowlist.permits(&Url::parse("http://172.17.0.3/logo.png").expect("url")));
    assert!(!allowlist.permits(&Url::parse("http://evil.example/172.17.0.2.png").expect("url")));
    assert!(!allowlist.permits(&Url::parse("ftp://172.17.0.2/logo.png").expect("url")));
}

#[test]
fn allowlist_normalizes_and_deduplicates() {
    let allowlist = ImageDomainAllowlist::new(["CDN.Example.com", " cdn.example.com ", ""]);
    assert_eq!(allowlist.domains(), ["cdn.example.com".to_string()]);
    assert!(allowlist.contains("cdn.EXAMPLE.com"));
    assert!(!allowlist.contains("img.cdn.example.com"));
}

#[test]
fn default_policy_reproduces_observed_allowlist() {
    let policy = policy();
    assert_eq!(policy.allowlist.domains(), ["172.17.0.2".to_string()]);
    assert!(policy.allows_width(640));
    assert!(policy.allows_width(16));
    assert!(!policy.allows_width(641));
    assert!(!policy.dangerously_allow_svg);
}

#[test]
fn parses_allowed_remote_image() {
    let request = policy()
        .parse_request(Some("url=http%3A%2F%2F172.17.0.2%3A5000%2Fmaps%2Fwest.png&w=640&q=75"))
        .expect("request");
    assert_eq!(
        request.source,
        ImageSource::Remote(Url::parse("http://172.17.0.2:5000/maps/west.png").expect("url"))
    );
    assert_eq!(request.width, 640);
    assert_eq!(request.quality, 75);
}

#[test]
fn rejects_host_outside_allowlist() {
    let err = policy()
        .parse_request(Some("url=http%3A%2F%2Fother.example%2Fa.png&w=640&q=75"))
        .expect_err("error");
    assert_eq!(message(err), "\"url\" parameter is not allowed");
}

#[test]
fn local_urls_skip_the_allowlist() {
    let request = policy()
        .parse_request(Some("url=%2Fapi%2Fmaps%2Feast.png%3Fv%3D2&w=1080&q=90"))
        .expect("request");
    assert_eq!(
        request.source,
        ImageSource::Local("/api/maps/east.png?v=2".to_string())
    );
}

#[test]
fn validates_required_parameters() {
    let cases = [
        ("w=640&q=75", "\"url\" parameter is required"),
        ("url=&w=640&q=75", "\"url\" parameter is required"),
        ("url=%2F%2F172.17.0.2%2Fa.png&w=640&q=75", "\"url\" parameter cannot be a protocol-relative URL (//)"),
        ("url=not%20a%20url&w=640&q=75", "\"url\" parameter is invalid"),
        ("url=data%3Aimage%2Fpng%3Bbase64%2CAAAA&w=640&q=75", "\"url\" parameter is invalid"),
        ("url=%2Fa.png&q=75", "\"w\" parameter (width) is required"),
        ("url=%2Fa.png&w=0&q=75", "\"w\" parameter (width) must be an integer greater than 0"),
        ("url=%2Fa.png&w=abc&q=75", "\"w\" parameter (width) must be an integer greater than 0"),
        ("url=%2Fa.png&w=500&q=75", "\"w\" parameter (width) of 500 is not allowed"),
        ("url=%2Fa.png&w=640", "\"q\" parameter (quality) is required"),
        ("url=%2Fa.png&w=640&q=0", "\"q\" parameter (quality) must be an integer between 1 and 100"),
        ("url=%2Fa.png&w=640&q=101", "\"q\" parameter (quality) must be an integer between 1 and 100"),
        ("url=%2Fa.png&url=%2Fb.png&w=640&q=75", "\"url\" parameter cannot be an array"),
    ];
    for (query, expected) in cases {
        let err = policy().parse_request(Some(query)).expect_err(query);
        assert_eq!(message(err), expected, "query {query}");
    }
}

#[test]
fn rejects_overlong_url() {
    let long_path = "a".repeat(3100);
    let query = format!("url=%2F{long_path}&w=640&q=75");
    let err = policy().parse_request(Some(&query)).expect_err("error");
    assert_eq!(message(err), "\"url\" parameter is too long");
}

#[test]
fn content_type_must_be_an_image() {
    let policy = policy();
    assert_eq!(
        policy.check_content_type(Some("image/PNG; charset=binary")).expect("png"),
        "image/png"
    );
    assert!(policy.check_content_type(Some("text/html")).is_err());
    assert!(policy.check_content_type(None).is_err());
    assert!(policy.check_content_type(Some("image/svg+xml")).is_err());
}

#[test]
fn svg_is_served_when_enabled() {
    let config = SystemConfigLoader::from_str(
        "images = { domains = [\"172.17.0.2\"], dangerously_allow_svg = true }",
    )
    .expect("config");
    let policy = ImagePolicy::from_config(&config);
    assert_eq!(
        policy.check_content_type(Some("image/svg+xml")).expect("svg"),
        "image/svg+xml"
    );
}
