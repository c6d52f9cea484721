#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

/// Minimal PDF with one Helvetica text line per page.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let page_count = pages.len();
    // 1 catalog, 2 pages, 3 font, then (page, contents) pairs from 4.
    let total_objects = 3 + 2 * page_count;
    let mut offsets = Vec::with_capacity(total_objects);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");

    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");

    let kids: Vec<String> = (0..page_count)
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect();
    offsets.push(out.len());
    out.extend_from_slice(
        format!(
            "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
            kids.join(" "),
            page_count
        )
        .as_bytes(),
    );

    offsets.push(out.len());
    out.extend_from_slice(
        b"3 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );

    for (i, text) in pages.iter().enumerate() {
        let page_id = 4 + 2 * i;
        let contents_id = page_id + 1;
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >> endobj\n",
                page_id, contents_id
            )
            .as_bytes(),
        );

        let stream = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", escape(text));
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
                contents_id,
                stream.len(),
                stream
            )
            .as_bytes(),
        );
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", total_objects + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            total_objects + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

/// Writes handbook.pdf and benefits.pdf into `dir`.
pub fn write_onboarding_pdfs(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(
        dir.join("handbook.pdf"),
        pdf_with_pages(&[
            "The vacation policy is 20 days per year.",
            "Office hours are flexible between 8 and 6.",
        ]),
    )
    .unwrap();
    fs::write(
        dir.join("benefits.pdf"),
        pdf_with_pages(&["Health insurance starts on the first of the month."]),
    )
    .unwrap();
}

/// Writes a config file whose paths all point inside `root`.
pub fn write_config(root: &Path, completion_provider: &str) -> PathBuf {
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_path = config_dir.join("onboard.toml");
    fs::write(
        &config_path,
        format!(
            r#"[docs]
folder = "{docs}"

[chunking]
size = 200
overlap = 40

[retrieval]
mode = "rag"
top_k = 2

[embedding]
provider = "hash"
dims = 256

[completion]
provider = "{completion}"

[storage]
data_dir = "{data}"
"#,
            docs = root.join("docs").display(),
            data = root.join("data").display(),
            completion = completion_provider,
        ),
    )
    .unwrap();
    config_path
}
