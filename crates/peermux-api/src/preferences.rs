//! Frozen qBittorrent preferences document.
//!
//! Upstream *arr tools parse this shape strictly; the field set is kept
//! bit-exact with qBittorrent and only `save_path`, `temp_path`, and
//! `web_ui_port` are populated from the bridge's configuration.

use serde_json::{Value, json};

use peermux_config::AppConfig;

/// Build the preferences document for the current configuration.
#[must_use]
pub fn preferences_json(config: &AppConfig) -> Value {
    json!({
        "add_trackers": "",
        "add_trackers_enabled": false,
        "alt_dl_limit": 10240,
        "alt_up_limit": 10240,
        "alternative_webui_enabled": false,
        "alternative_webui_path": "",
        "anonymous_mode": false,
        "auto_delete_mode": 0,
        "auto_tmm_enabled": false,
        "autorun_enabled": false,
        "autorun_program": "",
        "banned_IPs": "",
        "bittorrent_protocol": 0,
        "bypass_auth_subnet_whitelist": "",
        "bypass_auth_subnet_whitelist_enabled": false,
        "bypass_local_auth": !config.auth.enabled,
        "category_changed_tmm_enabled": false,
        "create_subfolder_enabled": true,
        "dht": true,
        "dl_limit": 0,
        "dont_count_slow_torrents": false,
        "dyndns_domain": "changeme.dyndns.org",
        "dyndns_enabled": false,
        "dyndns_password": "",
        "dyndns_service": 0,
        "dyndns_username": "",
        "embedded_tracker_port": 9000,
        "enable_coalesce_read_write": true,
        "enable_embedded_tracker": false,
        "enable_multi_connections_from_same_ip": false,
        "enable_os_cache": true,
        "enable_upload_suggestions": false,
        "encryption": 0,
        "export_dir": "",
        "export_dir_fin": "",
        "file_pool_size": 40,
        "incomplete_files_ext": false,
        "ip_filter_enabled": false,
        "ip_filter_path": "",
        "ip_filter_trackers": false,
        "limit_lan_peers": true,
        "limit_tcp_overhead": false,
        "limit_utp_rate": true,
        "listen_port": 6881,
        "locale": "en",
        "lsd": true,
        "mail_notification_auth_enabled": false,
        "mail_notification_email": "",
        "mail_notification_enabled": false,
        "mail_notification_password": "",
        "mail_notification_sender": "qBittorrent_notification@example.com",
        "mail_notification_smtp": "smtp.changeme.com",
        "mail_notification_ssl_enabled": false,
        "mail_notification_username": "",
        "max_active_downloads": 3,
        "max_active_torrents": 5,
        "max_active_uploads": 3,
        "max_connec": 500,
        "max_connec_per_torrent": 100,
        "max_ratio": -1,
        "max_ratio_act": 0,
        "max_ratio_enabled": false,
        "max_seeding_time": -1,
        "max_seeding_time_enabled": false,
        "max_uploads": -1,
        "max_uploads_per_torrent": -1,
        "pex": true,
        "preallocate_all": false,
        "proxy_auth_enabled": false,
        "proxy_ip": "0.0.0.0",
        "proxy_password": "",
        "proxy_peer_connections": false,
        "proxy_port": 8080,
        "proxy_torrents_only": false,
        "proxy_type": 0,
        "proxy_username": "",
        "queueing_enabled": false,
        "random_port": false,
        "rss_auto_downloading_enabled": false,
        "rss_max_articles_per_feed": 50,
        "rss_processing_enabled": false,
        "rss_refresh_interval": 30,
        "save_path": config.save_path.clone(),
        "save_path_changed_tmm_enabled": false,
        "save_resume_data_interval": 60,
        "scan_dirs": {},
        "schedule_from_hour": 8,
        "schedule_from_min": 0,
        "schedule_to_hour": 20,
        "schedule_to_min": 0,
        "scheduler_days": 0,
        "scheduler_enabled": false,
        "slow_torrent_dl_rate_threshold": 2,
        "slow_torrent_inactive_timer": 60,
        "slow_torrent_ul_rate_threshold": 2,
        "start_paused_enabled": false,
        "temp_path": config.temp_path.clone(),
        "temp_path_enabled": !config.temp_path.is_empty(),
        "torrent_changed_tmm_enabled": true,
        "up_limit": 0,
        "upnp": true,
        "use_https": false,
        "utp_tcp_mixed_mode": 0,
        "web_ui_address": "*",
        "web_ui_ban_duration": 3600,
        "web_ui_clickjacking_protection_enabled": true,
        "web_ui_csrf_protection_enabled": true,
        "web_ui_domain_list": "*",
        "web_ui_host_header_validation_enabled": true,
        "web_ui_max_auth_fail_count": 5,
        "web_ui_port": config.http.port,
        "web_ui_secure_cookie_enabled": true,
        "web_ui_session_timeout": 3600,
        "web_ui_upnp": false,
        "web_ui_username": config.auth.username.clone(),
    })
}
