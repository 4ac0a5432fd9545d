//! # Folio CLI
//!
//! Usage:
//!   folio render input.json -o output.pdf
//!   echo '{ ... }' | folio render -o output.pdf
//!   folio subset font.ttf "text to keep" -o subset.ttf
//!   folio --example > document.json
//!
//! Set `RUST_LOG=debug` to trace font parsing and object emission.

use std::env;
use std::fs;
use std::io::{self, Read};
use std::process;

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|a| a == "--example") {
        print!("{}", example_document_json());
        return;
    }

    let result = match args.first().map(String::as_str) {
        Some("render") => render(&args[1..]),
        Some("subset") => subset(&args[1..]),
        _ => {
            eprintln!("usage: folio render [input.json] [-o output.pdf]");
            eprintln!("       folio subset <font.ttf> <text> [-o output.ttf]");
            process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("✗ {}", e);
        process::exit(1);
    }
}

/// Value following `-o`, if given.
fn output_path(args: &[String]) -> Option<String> {
    args.windows(2).find(|w| w[0] == "-o").map(|w| w[1].clone())
}

/// Positional arguments, skipping `-o <path>`.
fn positional(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "-o" {
            iter.next();
        } else {
            out.push(arg.as_str());
        }
    }
    out
}

fn render(args: &[String]) -> folio::Result<()> {
    let input = match positional(args).first() {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let output = output_path(args).unwrap_or_else(|| "output.pdf".to_string());

    let pdf = folio::render_json(&input)?;
    fs::write(&output, &pdf)?;
    eprintln!("✓ Written {} bytes to {}", pdf.len(), output);
    Ok(())
}

fn subset(args: &[String]) -> folio::Result<()> {
    let positional = positional(args);
    let (font_path, text) = match positional.as_slice() {
        [font, text, ..] => (*font, *text),
        _ => {
            eprintln!("usage: folio subset <font.ttf> <text> [-o output.ttf]");
            process::exit(2);
        }
    };
    let output = output_path(args).unwrap_or_else(|| "subset.ttf".to_string());

    let font = folio::subset_font(font_path, text)?;
    fs::write(&output, &font)?;
    eprintln!("✓ Written {} bytes to {}", font.len(), output);
    Ok(())
}

fn example_document_json() -> &'static str {
    r##"{
  "options": {
    "compress": true,
    "displayMode": { "zoom": "fullwidth", "layout": "continuous" }
  },
  "metadata": {
    "title": "Folio sample",
    "author": "Folio"
  },
  "fonts": [
    { "name": "body", "type": "core", "font": "Helvetica" },
    { "name": "heading", "type": "core", "font": "Helvetica-Bold" }
  ],
  "aliasNbPages": "{nb}",
  "pages": [
    {
      "content": ["0.9 0.9 0.95 rg 0 780 595.28 61.89 re f", "0 g"],
      "text": [
        { "font": "heading", "size": 24, "x": 54, "y": 800, "text": "Folio" },
        { "font": "body", "size": 11, "x": 54, "y": 740, "text": "Page 1 of {nb}" },
        { "font": "body", "size": 11, "x": 54, "y": 720, "text": "Continue to the second page" }
      ],
      "links": [
        { "rect": [54, 716, 150, 14], "target": { "type": "page", "page": 1, "y": 841.89 } }
      ],
      "bookmarks": [{ "title": "Introduction", "y": 841.89 }]
    },
    {
      "text": [
        { "font": "body", "size": 11, "x": 54, "y": 780, "text": "Page 2 of {nb}" },
        { "font": "body", "size": 11, "x": 54, "y": 760, "text": "https://example.com" }
      ],
      "links": [
        { "rect": [54, 756, 110, 14], "target": { "type": "uri", "uri": "https://example.com" } }
      ],
      "bookmarks": [
        { "title": "Details", "y": 841.89 },
        { "title": "Links", "level": 1, "y": 780 }
      ]
    }
  ]
}
"##
}
