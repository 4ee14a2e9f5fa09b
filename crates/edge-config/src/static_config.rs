#[derive(Clone, Debug)]
pub struct StaticConfigItem {
    pub key: &'static str,
    pub description: &'static str,
    pub value_type: &'static str,
    pub default_value: &'static str,
}

pub const DEFAULT_REWRITE_SOURCE: &str = "/api/:path*";
pub const DEFAULT_REWRITE_DESTINATION: &str = "http://172.17.0.2:5000/:path*";

/// List values use a comma separated default.
pub static STATIC_CONFIG_TABLE: &[StaticConfigItem] = &[
    StaticConfigItem {
        key: "server.listen",
        description: "Socket address the edge server binds to",
        value_type: "string",
        default_value: "0.0.0.0:3000",
    },
    StaticConfigItem {
        key: "app.react_strict_mode",
        description: "Render double-invocation checks in the UI bundle (carried, not interpreted)",
        value_type: "boolean",
        default_value: "true",
    },
    StaticConfigItem {
        key: "proxy.timeout_ms",
        description: "Upstream request timeout in milliseconds",
        value_type: "number",
        default_value: "30000",
    },
    StaticConfigItem {
        key: "proxy.xfwd",
        description: "Append x-forwarded-* headers to proxied requests",
        value_type: "boolean",
        default_value: "true",
    },
    StaticConfigItem {
        key: "proxy.user_agent",
        description: "User agent injected when the client sent none (empty disables)",
        value_type: "string",
        default_value: "",
    },
    StaticConfigItem {
        key: "images.domains",
        description: "Hostnames permitted as external image sources",
        value_type: "string_list",
        default_value: "172.17.0.2",
    },
    StaticConfigItem {
        key: "images.device_sizes",
        description: "Accepted image widths for full-width layouts",
        value_type: "number_list",
        default_value: "640,750,828,1080,1200,1920,2048,3840",
    },
    StaticConfigItem {
        key: "images.image_sizes",
        description: "Accepted image widths for fixed layouts",
        value_type: "number_list",
        default_value: "16,32,48,64,96,128,256,384",
    },
    StaticConfigItem {
        key: "images.dangerously_allow_svg",
        description: "Serve image/svg+xml through the image endpoint",
        value_type: "boolean",
        default_value: "false",
    },
];
