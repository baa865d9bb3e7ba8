//! HTML pages for the web UI.

use std::fmt::Write as _;

use crate::record::Profile;

const TITLE: &str = "RFID Attendance Tracker";

const STYLE: &str = "\
body { font-family: Arial; margin: 0; padding: 0; background-color: #f2f2f2; }\
nav { background-color: #333; color: #fff; padding: 10px; }\
nav a { color: #fff; margin-right: 15px; text-decoration: none; }\
.container { padding: 20px; }\
table { width: 100%; border-collapse: collapse; }\
th, td { border: 1px solid #ddd; padding: 8px; }\
th { background-color: #333; color: white; }";

// Posts a row's name field to the rename endpoint.
const RENAME_SCRIPT: &str = "\
function rename(button) {\
  const uid = button.dataset.uid;\
  const name = button.closest('tr').querySelector('input').value;\
  fetch('/api/updateName', {\
    method: 'POST',\
    headers: { 'Content-Type': 'application/json' },\
    body: JSON.stringify({ uid: uid, name: name })\
  }).then(r => r.json()).then(res => {\
    if (!res.success) { alert('Rename failed: ' + (res.error || 'unknown error')); }\
  });\
}";

/// Escape text for use in HTML content and quoted attributes.
#[must_use]
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

fn render_header(html: &mut String, title: &str) {
    html.push_str("<!DOCTYPE html><html><head>");
    html.push_str("<meta name='viewport' content='width=device-width, initial-scale=1'>");
    let _ = write!(html, "<title>{}</title>", escape(title));
    let _ = write!(html, "<style>{STYLE}</style></head><body>");
    html.push_str(
        "<nav><a href='/'>Home</a><a href='/profiles'>Profiles</a>\
         <a href='/exportData'>Export Data</a></nav>",
    );
}

fn render_footer(html: &mut String) {
    html.push_str("</body></html>");
}

/// The landing page showing the device's current time.
#[must_use]
pub fn status_page(current_time: &str) -> String {
    let mut html = String::new();
    render_header(&mut html, TITLE);
    html.push_str("<div class='container'>");
    html.push_str("<h1>Welcome to the RFID Attendance Tracker</h1>");
    html.push_str("<p>Use your RFID card to register your attendance.</p>");
    let _ = write!(html, "<p>Current Time: {}</p>", escape(current_time));
    html.push_str("</div>");
    render_footer(&mut html);
    html
}

/// The table of every known card.
#[must_use]
pub fn profiles_page(profiles: &[Profile]) -> String {
    let mut html = String::new();
    render_header(&mut html, "Profiles");
    html.push_str("<div class='container'><h1>Profiles</h1>");

    if profiles.is_empty() {
        html.push_str("<p>No cards have been scanned yet.</p>");
    } else {
        html.push_str("<table><tr><th>UID</th><th>Name</th><th>Last Scanned</th><th></th></tr>");
        for profile in profiles {
            let key = escape(&profile.key);
            let uid = escape(&profile.uid);
            let name = escape(profile.name.as_deref().unwrap_or(""));
            let last_scanned = escape(profile.last_scanned.as_deref().unwrap_or("Never"));
            let _ = write!(
                html,
                "<tr><td>{uid}</td>\
                 <td><input value=\"{name}\"></td>\
                 <td>{last_scanned}</td>\
                 <td><button data-uid=\"{key}\" onclick=\"rename(this)\">Save</button></td></tr>"
            );
        }
        html.push_str("</table>");
        let _ = write!(html, "<script>{RENAME_SCRIPT}</script>");
    }

    html.push_str("</div>");
    render_footer(&mut html);
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
        assert_eq!(escape("Alice"), "Alice");
    }

    #[test]
    fn test_status_page() {
        let html = status_page("2024-01-01 00:00:00");
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<p>Current Time: 2024-01-01 00:00:00</p>"));
        assert!(html.contains("<a href='/profiles'>Profiles</a>"));
        assert!(html.ends_with("</body></html>"));
    }

    #[test]
    fn test_profiles_page_rows() {
        let profiles = vec![
            Profile {
                key: "041AFF".to_string(),
                uid: "041AFF".to_string(),
                name: Some("Alice".to_string()),
                last_scanned: Some("2024-01-01 00:00:00".to_string()),
            },
            Profile {
                key: "0A".to_string(),
                uid: "0A".to_string(),
                name: None,
                last_scanned: None,
            },
        ];
        let html = profiles_page(&profiles);
        assert!(html.contains("<td>041AFF</td>"));
        assert!(html.contains("value=\"Alice\""));
        assert!(html.contains("<td>Never</td>"));
        assert!(html.contains("data-uid=\"0A\" onclick=\"rename(this)\""));
    }

    #[test]
    fn test_profiles_page_empty() {
        let html = profiles_page(&[]);
        assert!(html.contains("No cards have been scanned yet."));
        assert!(!html.contains("<table>"));
    }

    #[test]
    fn test_profiles_page_escapes_names() {
        let profiles = vec![Profile {
            key: "0A".to_string(),
            uid: "0A".to_string(),
            name: Some("<script>alert(1)</script>".to_string()),
            last_scanned: None,
        }];
        let html = profiles_page(&profiles);
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!html.contains("<script>alert(1)"));
    }

    #[test]
    fn test_profiles_page_keeps_uid_out_of_script() {
        let profiles = vec![Profile {
            key: "0A".to_string(),
            uid: "x');alert(1);('".to_string(),
            name: None,
            last_scanned: None,
        }];
        let html = profiles_page(&profiles);
        assert!(html.contains("<td>x&#39;);alert(1);(&#39;</td>"));
        assert!(html.contains("data-uid=\"0A\""));
        assert!(!html.contains("rename('"));
        assert!(!html.contains("alert(1);('"));
    }
}
