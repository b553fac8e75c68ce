//! HTML control page.

use std::fmt::Write as _;

use crate::build_info;
use crate::card::RelayState;
use crate::dispatch::{Outcome, Snapshot};
use crate::error::RelayError;

const STYLE: &str = r#"<style>
body { font-family: Helvetica, Arial, sans-serif; margin: 1em; }
.banner, .footer { width: 460px; background-color: #2196F3; color: white; padding: 4px; }
.banner h1 { margin: 0; font-size: 44px; }
.banner p { margin: 0; font-size: 16px; color: #ccffff; }
.footer { text-align: center; font-size: 14px; }
.footer a { color: white; text-decoration: none; }
table.relays { width: 460px; font-weight: bold; font-size: 20px; border-spacing: 3px; }
table.relays td { padding: 4px; }
tr.card td { font-size: 14px; background-color: lightgrey; }
tr.relay td.name { background-color: #e6e6ff; width: 300px; }
.sub { font-style: italic; font-size: 12px; color: grey; font-weight: normal; }
.switch { position: relative; display: inline-block; width: 60px; height: 34px; }
.switch input { opacity: 0; width: 0; height: 0; }
.slider { position: absolute; cursor: pointer; top: 0; left: 0; right: 0; bottom: 0;
  background-color: #ccc; transition: .4s; }
.slider:before { position: absolute; content: ""; height: 26px; width: 26px; left: 4px;
  bottom: 4px; background-color: white; transition: .4s; }
input:checked + .slider { background-color: #2196F3; }
input:focus + .slider { box-shadow: 0 0 1px #2196F3; }
input:checked + .slider:before { transform: translateX(26px); }
.error { width: 460px; background-color: yellow; padding: 4px; }
.error h2 { margin: 0; font-size: 20px; }
.error div { font-size: 14px; color: grey; }
#status { font-size: 16px; color: red; }
</style>"#;

const SCRIPT: &str = r#"<script>
function refreshRelays(text) {
  for (const line of text.split(/\r?\n/)) {
    const m = /^Relay (\d+):(\d)$/.exec(line.trim());
    if (!m) continue;
    const box = document.getElementById("relay" + m[1]);
    if (box) box.checked = m[2] === "1";
  }
}
function switchRelay(box) {
  const status = document.getElementById("status");
  const params = new URLSearchParams({ pin: box.dataset.pin, status: box.checked ? "1" : "0" });
  const serial = document.getElementById("relays").dataset.serial;
  if (serial) params.set("serial", serial);
  status.textContent = "";
  fetch("/gpio", { method: "POST", body: params })
    .then(resp => resp.text().then(text => {
      if (resp.ok) {
        refreshRelays(text);
      } else {
        status.textContent = text.trim() || resp.statusText;
        box.checked = !box.checked;
      }
    }))
    .catch(() => {
      status.textContent = "Network error";
      box.checked = !box.checked;
    });
}
</script>"#;

/// Render the control page for a dispatch result.
///
/// `labels` holds the eight channel labels; `serial` is the filter the page
/// was requested with and is carried into the switch requests.
pub fn render(result: &Result<Outcome, RelayError>, labels: &[String], serial: Option<&str>) -> String {
    let mut html = String::with_capacity(8 * 1024);
    html.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str("<title>Relay Card Control</title>\n");
    html.push_str(STYLE);
    html.push('\n');
    html.push_str(SCRIPT);
    html.push_str("\n</head><body>\n");
    html.push_str(
        "<div class=\"banner\"><h1>Relay Card Control</h1>\
         <p>Remote relay card control <em>made easy</em></p></div><br>\n",
    );

    match result {
        Ok(Outcome::Snapshot(snapshot)) => relay_table(&mut html, snapshot, labels, serial),
        Ok(Outcome::Card(card)) => {
            let _ = writeln!(
                html,
                "<p>{} on {}</p>",
                escape(card.card_type.display_name()),
                escape(&card.path)
            );
        }
        Ok(Outcome::Cards(cards)) => {
            html.push_str("<ul>\n");
            for card in cards {
                let _ = writeln!(
                    html,
                    "<li>{} on {}</li>",
                    escape(card.card_type.display_name()),
                    escape(&card.path)
                );
            }
            html.push_str("</ul>\n");
        }
        Err(err) => error_block(&mut html, err),
    }

    let _ = writeln!(
        html,
        "<div class=\"footer\"><a href=\"https://ondrej1024.github.io/crelay\">crelay</a> | version {}</div>",
        escape(build_info::VERSION_LINE)
    );
    html.push_str("</body></html>\n");
    html
}

fn relay_table(html: &mut String, snapshot: &Snapshot, labels: &[String], serial: Option<&str>) {
    let card = &snapshot.card;
    let _ = writeln!(
        html,
        "<form id=\"relays\" data-serial=\"{}\"><table class=\"relays\"><tbody>",
        escape(serial.unwrap_or_default())
    );
    let _ = writeln!(
        html,
        "<tr class=\"card\"><td>{}<br><span class=\"sub\">on {}</span></td><td></td></tr>",
        escape(card.card_type.display_name()),
        escape(&card.path)
    );
    for (channel, state) in &snapshot.channels {
        let n = channel.number();
        let label = labels.get(channel.index()).map(String::as_str).unwrap_or_default();
        let checked = if *state == RelayState::On { " checked" } else { "" };
        let _ = writeln!(
            html,
            "<tr class=\"relay\"><td class=\"name\">Relay {n}<br><span class=\"sub\">{}</span></td>\
             <td><label class=\"switch\"><input type=\"checkbox\" id=\"relay{n}\" data-pin=\"{n}\"{checked} \
             onchange=\"switchRelay(this)\"><span class=\"slider\"></span></label></td></tr>",
            escape(label)
        );
    }
    html.push_str("</tbody></table></form>\n<p id=\"status\"></p>\n");
}

fn error_block(html: &mut String, err: &RelayError) {
    if err.is_no_device() {
        html.push_str(
            "<div class=\"error\"><h2>No compatible relay card detected!</h2>\n\
             <div>This can be due to the following reasons:</div>\n\
             <div>- No supported relay card is connected via USB cable</div>\n\
             <div>- The relay card is connected but it is broken</div>\n\
             <div>- There is no GPIO sysfs support available or GPIO pins are not configured</div>\n\
             <div>- You don't have permission to access the device</div>\n\
             </div><br>\n",
        );
    } else {
        let _ = writeln!(
            html,
            "<div class=\"error\"><h2>ERROR</h2><div>{}</div></div><br>",
            escape(&err.to_string())
        );
    }
}

/// Minimal HTML escaping for text and attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
