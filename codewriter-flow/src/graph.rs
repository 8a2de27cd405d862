//! Flow graph rendering for `codewriter plot`

/// Steps and edges of the flow as Mermaid source
pub fn mermaid() -> String {
    [
        "flowchart TD",
        "    get_user_input([get_user_input]) --> write_python_code[write_python_code]",
        "    write_python_code --> test_and_fix_code[test_and_fix_code]",
        "    test_and_fix_code --> review_result{review_result}",
        "    review_result -- iterate --> test_and_fix_code",
        "    review_result -- terminate --> finalize_code([finalize_code])",
    ]
    .join("\n")
}

/// A standalone HTML page that renders [`mermaid`] in the browser
pub fn render_html(title: &str) -> String {
    let title = escape_html(title);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<script type="module">
  import mermaid from "https://cdn.jsdelivr.net/npm/mermaid@10/dist/mermaid.esm.min.mjs";
  mermaid.initialize({{ startOnLoad: true }});
</script>
</head>
<body>
<h1>{title}</h1>
<pre class="mermaid">
{graph}
</pre>
</body>
</html>
"#,
        title = title,
        graph = escape_html(&mermaid())
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mermaid_has_every_step_and_route() {
        let graph = mermaid();
        assert!(graph.starts_with("flowchart TD"));
        for step in [
            "get_user_input",
            "write_python_code",
            "test_and_fix_code",
            "review_result",
            "finalize_code",
        ] {
            assert!(graph.contains(step), "missing {}", step);
        }
        assert!(graph.contains("-- iterate --> test_and_fix_code"));
        assert!(graph.contains("-- terminate --> finalize_code"));
    }

    #[test]
    fn test_render_html_escapes() {
        let html = render_html("Code <Writer>");
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Code &lt;Writer&gt;</title>"));
        assert!(html.contains("review_result -- iterate --&gt; test_and_fix_code"));
    }
}
