//! Server-rendered index page.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub fn render_index(files: &[String]) -> String {
    let listing = if files.is_empty() {
        "      <p class=\"empty\">No files yet.</p>\n".to_string()
    } else {
        let items: String = files
            .iter()
            .map(|name| {
                format!(
                    "        <li><a href=\"{}\" download>{}</a></li>\n",
                    output_href(name),
                    escape_html(name)
                )
            })
            .collect();
        format!("      <ul id=\"fileList\">\n{items}      </ul>\n")
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <title>Video Splitter</title>
  </head>
  <body>
    <h1>Video Splitter</h1>
    <form id="uploadForm" action="/split" method="post" enctype="multipart/form-data">
      <input id="videoInput" type="file" name="video" accept="video/*" required>
      <label for="duration">Part length (seconds)</label>
      <input id="duration" type="number" name="duration" min="1" value="60" required>
      <button id="splitButton" type="submit">Split</button>
    </form>
    <form id="clearForm" action="/clear" method="post">
      <button id="clearButton" type="submit">Clear</button>
    </form>
    <section>
      <h2>Output</h2>
{listing}    </section>
  </body>
</html>
"#
    )
}

pub fn output_href(name: &str) -> String {
    format!("/output/{}", utf8_percent_encode(name, PATH_SEGMENT))
}

fn escape_html(text: &str) -> String {
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
