#![allow(dead_code)]

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use touhou_group::config::RemoteOptions;

pub static LOGO_PNG: &[u8] = &[
    137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13, 73, 72, 68, 82, 0, 0, 0, 1, 0, 0, 0, 1, 8, 4, 0,
    0, 0, 181, 28, 12, 2, 0, 0, 0, 11, 73, 68, 65, 84, 120, 218, 99, 252, 255, 23, 0, 2, 3, 1, 128,
    110, 220, 25, 0, 0, 0, 0, 73, 69, 78, 68, 174, 66, 96, 130,
];

pub const PAGE_TITLE: &str = "东方相关QQ群组列表";

/// A MediaWiki stand-in serving one page, its revision and two images
/// (`/upload/alpha.png` exists, `/upload/missing.png` is a 404).
pub struct WikiStub {
    pub base_url: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl WikiStub {
    pub fn spawn() -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start wiki stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");
        let page_html = page_html(&base_url);

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let url = request.url().to_string();
                let path = url.split('?').next().unwrap_or(&url);

                let (status, content_type, body) = match path {
                    "/api.php" if url.contains("action=query") => {
                        (200, "application/json", revision_json().into_bytes())
                    }
                    "/api.php" if url.contains("action=parse") && url.contains("variant=error") => {
                        (200, "application/json", error_json().into_bytes())
                    }
                    "/api.php" if url.contains("action=parse") => {
                        (200, "application/json", parse_json(&page_html).into_bytes())
                    }
                    "/upload/alpha.png" => (200, "image/png", LOGO_PNG.to_vec()),
                    _ => (404, "text/plain", b"not found".to_vec()),
                };

                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
                        .expect("build header");
                let response = tiny_http::Response::from_data(body)
                    .with_status_code(status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn revision_api(&self) -> String {
        format!("{}/api.php?action=query&format=json&formatversion=2", self.base_url)
    }

    pub fn parse_api(&self) -> String {
        format!("{}/api.php?action=parse&format=json&formatversion=2", self.base_url)
    }

    pub fn error_parse_api(&self) -> String {
        format!("{}&variant=error", self.parse_api())
    }

    /// Options pointing at this stub with every output under `out`.
    pub fn options(&self, out: &std::path::Path) -> RemoteOptions {
        let mut options = RemoteOptions {
            info_destination_file: out.join("public/info.json"),
            json_destination_dir: out.join("lists"),
            ..RemoteOptions::default()
        };
        options.source.revision_api = self.revision_api();
        options.source.parse_api = self.parse_api();
        options.source.image_domains = vec!["127.0.0.1".to_owned()];
        options.source.image_schemes = vec!["http".to_owned()];
        options.source.timeout_secs = 5;
        options.source.image_concurrency = 2;
        options.docsify.site_root = out.join("site");
        options
    }
}

impl Drop for WikiStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn page_html(base_url: &str) -> String {
    format!(
        r#"<div class="mw-parser-output">
<ul><li>加群前请先阅读<a href="/Rules">群规</a></li></ul>
<h2><span class="mw-headline">综合</span></h2>
<h3><span class="mw-headline">同人</span></h3>
<table><tbody>
<tr><th>标签</th><th>群号</th><th>群名</th><th>备注</th></tr>
<tr><td>[地区]上海、同人</td><td>10001</td><td>Alpha</td><td><a href="/Alpha"><img src="{base_url}/upload/alpha.png"></a> 活跃</td></tr>
<tr><td>-</td><td>10002</td><td><span class="inside">Beta</span></td><td><img src="{base_url}/upload/missing.png"></td></tr>
<tr><td>-</td><td>not-a-number</td><td>Broken</td><td></td></tr>
</tbody></table>
<h2><span class="mw-headline">注意事项</span></h2>
<h3><span class="mw-headline">其他</span></h3>
<table><tbody>
<tr><td>10003</td><td>Gamma</td><td><img src="https://elsewhere.example/g.png"></td></tr>
</tbody></table>
</div>"#
    )
}

fn revision_json() -> String {
    serde_json::json!({
        "batchcomplete": true,
        "query": {
            "pages": [{
                "pageid": 1,
                "ns": 0,
                "title": PAGE_TITLE,
                "revisions": [{
                    "revid": 99,
                    "parentid": 98,
                    "timestamp": "2024-01-02T03:04:05Z"
                }]
            }]
        }
    })
    .to_string()
}

fn parse_json(html: &str) -> String {
    serde_json::json!({
        "parse": {
            "title": PAGE_TITLE,
            "pageid": 1,
            "revid": 99,
            "text": html,
            "limitreportdata": [
                { "name": "cachereport-timestamp", "0": "20240305123456" }
            ]
        }
    })
    .to_string()
}

fn error_json() -> String {
    serde_json::json!({
        "error": {
            "code": "missingtitle",
            "info": "The page you specified doesn't exist."
        }
    })
    .to_string()
}
