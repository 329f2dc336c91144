//! A tiny live configuration panel.
//!
//! ```text
//! cargo run --example config_panel
//! curl -v http://127.0.0.1:8080/
//! curl -v -d "speed=2.5&title=hello+world" http://127.0.0.1:8080/set
//! ```

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use http::{Method, StatusCode};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;
use webconfig_http::escape::{html_encode, url_encode};
use webconfig_http::handler::Handler;
use webconfig_http::protocol::{Request, Response};
use webconfig_http::server::{HttpServer, ServerConfig};

struct Panel {
    values: BTreeMap<String, String>,
}

impl Panel {
    fn render(&self) -> String {
        let mut page = String::from("<html><body><h1>settings</h1><form method=\"post\" action=\"/set\">");
        for (name, value) in &self.values {
            page.push_str(&format!(
                "<p><a href=\"/?focus={}\">{}</a> <input name=\"{}\" value=\"{}\"></p>",
                url_encode(name),
                html_encode(name),
                html_encode(name),
                html_encode(value)
            ));
        }
        page.push_str("<input type=\"submit\" value=\"apply\"></form></body></html>");
        page
    }
}

impl Handler for Panel {
    fn handle(&mut self, request: &Request, response: &mut Response) {
        match (request.method(), request.path()) {
            (&Method::GET, "/") => response.html(self.render()),
            (&Method::POST, "/set") => {
                for (name, value) in request.form() {
                    if let Some(slot) = self.values.get_mut(&name) {
                        info!(%name, %value, "value changed");
                        *slot = value;
                    }
                }
                response.html(self.render());
            }
            (&Method::GET, "/values.txt") => {
                let text: String = self.values.iter().map(|(name, value)| format!("{name}={value}\n")).collect();
                response.set_content_type(&mime::TEXT_PLAIN_UTF_8);
                response.set_body(text);
            }
            _ => {
                response.set_status(StatusCode::NOT_FOUND);
                response.html("<h1>not found</h1>");
            }
        }
    }
}

fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let values = [("speed", "1.0"), ("title", "demo"), ("verbose", "false")];
    let panel = Panel { values: values.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect() };

    let config = match ServerConfig::builder().address(Ipv4Addr::LOCALHOST).poll_timeout(Duration::from_millis(10)).build() {
        Ok(config) => config,
        Err(e) => {
            error!(cause = %e, "invalid server config");
            return;
        }
    };

    let mut server = match HttpServer::with_config(panel, config) {
        Ok(server) => server,
        Err(e) => {
            error!(cause = %e, "can't create server");
            return;
        }
    };

    if let Err(e) = server.start(8080) {
        error!(cause = %e, "bind server error");
        return;
    }

    loop {
        // the host application's frame work would go here
        if let Err(e) = server.update() {
            error!(cause = %e, "reactor failed");
            return;
        }
    }
}
