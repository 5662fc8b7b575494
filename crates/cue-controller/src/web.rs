//! Minimal admin page for the prop host.
//!
//! Serves a single embedded panel with shutdown/reboot buttons for the
//! operator, so a headless prop box can be powered off safely without SSH.
//! Both actions require an explicit `{"confirm": true}` body.

use std::io::Read;
use std::net::SocketAddr;
use std::process::Command;
use std::thread;
use std::time::Duration;

use tiny_http::{Header, Method, Response, Server, StatusCode};

const PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width,initial-scale=1" />
  <title>Prop Controller</title>
  <style>
    body { margin: 0; min-height: 100vh; display: grid; place-items: center;
           background: #101820; color: #e8eef5; font-family: sans-serif; }
    .panel { padding: 24px 32px; border-radius: 12px; background: #1b2836;
             text-align: center; }
    button { margin: 6px; padding: 10px 18px; border: 0; border-radius: 8px;
             background: #c23b40; color: #fff; font-size: 1rem; cursor: pointer; }
    button.secondary { background: #3b6ea5; }
    #status { margin-top: 12px; min-height: 1.2em; font-size: 0.9rem; color: #9db1c7; }
  </style>
</head>
<body>
  <div class="panel">
    <h1>Prop Controller</h1>
    <p>Power control for this prop host.</p>
    <button onclick="act('shutdown', 'Shut down this host now?')">Shutdown</button>
    <button class="secondary" onclick="act('reboot', 'Reboot this host now?')">Reboot</button>
    <div id="status" aria-live="polite"></div>
  </div>
  <script>
    async function act(kind, prompt) {
      if (!window.confirm(prompt)) return;
      const status = document.getElementById("status");
      status.textContent = "Sending request...";
      try {
        const res = await fetch("/api/" + kind, {
          method: "POST",
          headers: { "Content-Type": "application/json" },
          body: JSON.stringify({ confirm: true })
        });
        const data = await res.json().catch(() => ({}));
        if (!res.ok) throw new Error(data.error || "request failed");
        status.textContent = data.message || "Accepted.";
      } catch (err) {
        status.textContent = "Error: " + err.message;
      }
    }
  </script>
</body>
</html>
"#;

#[derive(serde::Deserialize)]
struct ConfirmRequest {
    confirm: Option<bool>,
}

/// Spawn the admin HTTP server thread.
pub fn spawn_admin_server(bind: SocketAddr) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(bind) {
            Ok(server) => server,
            Err(e) => {
                tracing::error!(error = %e, "admin server bind failed");
                return;
            }
        };
        tracing::info!(bind = %bind, "admin page listening");

        for mut request in server.incoming_requests() {
            let method = request.method().clone();
            let url = request.url().split('?').next().unwrap_or("").to_string();
            let response = match (method, url.as_str()) {
                (Method::Get, "/") | (Method::Get, "/index.html") => {
                    Response::from_string(PAGE).with_header(
                        Header::from_bytes("Content-Type", "text/html; charset=utf-8").unwrap(),
                    )
                }
                (Method::Post, "/api/shutdown") => power_response(&mut request, "poweroff"),
                (Method::Post, "/api/reboot") => power_response(&mut request, "reboot"),
                _ => json_response(404, &serde_json::json!({ "error": "not found" })),
            };
            let _ = request.respond(response);
        }
    })
}

fn power_response(
    request: &mut tiny_http::Request,
    action: &'static str,
) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut body = String::new();
    if request.as_reader().read_to_string(&mut body).is_err() {
        return json_response(400, &serde_json::json!({ "error": "unreadable body" }));
    }
    let confirmed = serde_json::from_str::<ConfirmRequest>(&body)
        .map(|req| req.confirm == Some(true))
        .unwrap_or(false);
    if !confirmed {
        return json_response(400, &serde_json::json!({ "error": "missing confirm=true" }));
    }

    tracing::warn!(action, "host power action requested via admin page");
    schedule_power_action(action);
    json_response(
        202,
        &serde_json::json!({ "message": format!("{action} request accepted") }),
    )
}

/// Run the power action after a short delay so the HTTP response flushes.
fn schedule_power_action(action: &'static str) {
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(1));
        let _ = Command::new("sync").status();
        if let Err(e) = Command::new("systemctl").arg(action).status() {
            tracing::error!(action, "systemctl failed: {e}");
        }
    });
}

fn json_response<T: serde::Serialize>(status: u16, body: &T) -> Response<std::io::Cursor<Vec<u8>>> {
    let json = serde_json::to_vec(body).unwrap_or_default();
    Response::from_data(json)
        .with_status_code(StatusCode(status))
        .with_header(Header::from_bytes("Content-Type", "application/json").unwrap())
}
