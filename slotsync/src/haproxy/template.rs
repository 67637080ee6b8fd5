//! HAProxy configuration rendering
//!
//! Uses Handlebars with `add` and `subtract` helpers so the template can
//! express the `server-template` slot range.

use anyhow::{Context, Result};
use handlebars::{handlebars_helper, no_escape, Handlebars};
use serde::Serialize;
use std::time::Duration;

use slotsync_core::HaproxyConfig;

const TEMPLATE_NAME: &str = "haproxy.cfg";

const HAPROXY_TEMPLATE: &str = r"global
  log stdout format raw local0
  stats socket {{admin_socket}} mode 660 level admin
  nbthread {{threads}}
  maxconn {{maxconn}}

defaults
  mode http
  retries 3
  timeout connect {{timeout_connect}}
  timeout client {{timeout_client}}
  timeout server {{timeout_server}}
  timeout check {{timeout_check}}
{{#if enable_logs}}
  log global
  option httplog
{{/if}}
  option srvtcpka

listen upstream
  bind {{bind}}
  hash-type consistent
  balance {{balance}}
  option httpchk
  http-check send {{http_check}}
  server-template be 0-{{subtract slots 1}} 127.0.0.1:1 init-addr none check disabled
{{#if stats_bind}}

listen stats
  bind {{stats_bind}}
  stats enable
  stats refresh 30s
  stats show-node
  stats uri /
{{/if}}
{{#if health_bind}}

listen health
  bind {{health_bind}}
  monitor-uri /
{{/if}}
";

handlebars_helper!(add: |a: i64, b: i64| a + b);
handlebars_helper!(subtract: |a: i64, b: i64| a - b);

#[derive(Debug, Serialize)]
struct TemplateContext<'a> {
    admin_socket: String,
    threads: u32,
    maxconn: u32,
    timeout_connect: String,
    timeout_client: String,
    timeout_server: String,
    timeout_check: String,
    enable_logs: bool,
    bind: &'a str,
    balance: &'a str,
    http_check: &'a str,
    slots: usize,
    stats_bind: Option<&'a str>,
    health_bind: Option<&'a str>,
}

impl<'a> TemplateContext<'a> {
    fn new(config: &'a HaproxyConfig) -> Self {
        Self {
            admin_socket: config.admin_socket.display().to_string(),
            threads: config.threads,
            maxconn: config.maxconn,
            timeout_connect: haproxy_duration(config.timeout_connect),
            timeout_client: haproxy_duration(config.timeout_client),
            timeout_server: haproxy_duration(config.timeout_server),
            timeout_check: haproxy_duration(config.timeout_check),
            enable_logs: config.enable_logs,
            bind: &config.bind,
            balance: &config.balance,
            http_check: &config.http_check,
            slots: config.slots,
            stats_bind: config.stats_bind.as_deref().filter(|s| !s.is_empty()),
            health_bind: config.health_bind.as_deref().filter(|s| !s.is_empty()),
        }
    }
}

/// HAProxy time format; milliseconds keep it exact for any duration
fn haproxy_duration(value: Duration) -> String {
    format!("{}ms", value.as_millis())
}

/// Renders the static HAProxy configuration
pub struct ConfigRenderer {
    handlebars: Handlebars<'static>,
}

impl ConfigRenderer {
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        // Output is a config file, not HTML
        handlebars.register_escape_fn(no_escape);
        handlebars.register_helper("add", Box::new(add));
        handlebars.register_helper("subtract", Box::new(subtract));
        handlebars
            .register_template_string(TEMPLATE_NAME, HAPROXY_TEMPLATE)
            .context("Failed to register HAProxy config template")?;

        Ok(Self { handlebars })
    }

    pub fn render(&self, config: &HaproxyConfig) -> Result<String> {
        self.handlebars
            .render(TEMPLATE_NAME, &TemplateContext::new(config))
            .context("Failed to render HAProxy config")
    }
}
