//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# huddle configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[ice]
# candidate_pool_size = 10   # 0-255

[[ice.servers]]
urls = ["stun:stun.l.google.com:19302"]

[negotiation]
# timeout_secs = 30          # 0 disables, max 600

[media]
# video = true               # try camera first
# audio = true

[screen_share]
# enabled = true
# quality = "medium"         # low, medium, high, ultra

[signaling]
# url = "ws://127.0.0.1:8000/ws"
# connect_timeout_secs = 15
# reconnect_delay_secs = 1
# max_reconnect_delay_secs = 30

[relay]
# bind = "0.0.0.0"
# port = 8000                # 1024-65535
# join_timeout_secs = 10
# exclusive_screen_share = false

[logging]
# level = "INFO"             # DEBUG, INFO, WARNING, ERROR
"##
    .to_string()
}
