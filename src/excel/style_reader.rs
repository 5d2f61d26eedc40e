//! Seed StyleMaps from a source workbook.
//!
//! calamine reads values only, so cell styles are read straight from the
//! package: `xl/workbook.xml` (+ rels) for sheet paths, `xl/styles.xml` for
//! the fonts, fills, borders and cell formats (xf), and each worksheet's
//! `<c r=".." s="..">` elements for the style index of every cell.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek};
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

use crate::error::{EngineError, EngineResult};
use crate::style::{
    Alignment, Border, BorderLine, CellStyle, Fill, Font, HAlign, Rgb, StyleMap, VAlign,
};

/// Read per-sheet styles, in workbook order
pub fn read_source_styles(path: &Path) -> EngineResult<Vec<(String, StyleMap)>> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| {
            EngineError::Import(format!("{} is not an xlsx package: {}", path.display(), e))
        })?;

    let rels = read_relationships(&mut archive)?;
    let sheets = read_sheet_list(&mut archive, &rels)?;
    let xfs = match archive.by_name("xl/styles.xml") {
        Ok(file) => parse_styles(BufReader::new(file))?,
        Err(_) => Vec::new(),
    };

    let mut out = Vec::with_capacity(sheets.len());
    for (name, sheet_path) in sheets {
        let cells = match archive.by_name(&sheet_path) {
            Ok(file) => parse_cell_styles(BufReader::new(file))?,
            Err(_) => Vec::new(),
        };
        let mut map = StyleMap::new();
        for (row, col, xf) in cells {
            if let Some(style) = xfs.get(xf) {
                map.set(row, col, style.clone());
            }
        }
        debug!(sheet = %name, styled_cells = map.len(), "source styles read");
        out.push((name, map));
    }
    Ok(out)
}

fn xml_error(part: &str, e: quick_xml::Error) -> EngineError {
    EngineError::Import(format!("Malformed {}: {}", part, e))
}

fn attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key || a.key.local_name().as_ref() == key)
        .and_then(|a| std::str::from_utf8(&a.value).ok().map(str::to_string))
}

fn attr_usize(e: &BytesStart, key: &[u8]) -> Option<usize> {
    attr(e, key).and_then(|v| v.parse().ok())
}

//==============================================================================
// Package structure
//==============================================================================

/// Relationship id → part path
fn read_relationships<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> EngineResult<HashMap<String, String>> {
    let mut rels = HashMap::new();
    let Ok(file) = archive.by_name("xl/_rels/workbook.xml.rels") else {
        return Ok(rels);
    };
    let mut xml = Reader::from_reader(BufReader::new(file));
    xml.trim_text(true);
    let mut buf = Vec::new();
    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e) | Event::Empty(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attr(e, b"Id"), attr(e, b"Target")) {
                    let path = match target.strip_prefix('/') {
                        Some(stripped) => stripped.to_string(),
                        None => format!("xl/{}", target),
                    };
                    rels.insert(id, path);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("workbook relationships", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

/// (sheet name, part path) in workbook order
fn read_sheet_list<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    rels: &HashMap<String, String>,
) -> EngineResult<Vec<(String, String)>> {
    let file = archive
        .by_name("xl/workbook.xml")
        .map_err(|e| EngineError::Import(format!("Missing xl/workbook.xml: {}", e)))?;
    let mut xml = Reader::from_reader(BufReader::new(file));
    xml.trim_text(true);

    let mut sheets = Vec::new();
    let mut buf = Vec::new();
    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e) | Event::Empty(ref e)) if e.local_name().as_ref() == b"sheet" =>
            {
                let Some(name) = attr(e, b"name") else { continue };
                let path = attr(e, b"id")
                    .and_then(|id| rels.get(&id).cloned())
                    .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", sheets.len() + 1));
                sheets.push((name, path));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("workbook.xml", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(sheets)
}

//==============================================================================
// styles.xml
//==============================================================================

#[derive(Default)]
struct RawXf {
    num_fmt: usize,
    font: usize,
    fill: usize,
    border: usize,
    alignment: Alignment,
}

/// Resolve every `cellXfs` entry into a CellStyle
fn parse_styles<R: BufRead>(reader: R) -> EngineResult<Vec<CellStyle>> {
    let mut xml = Reader::from_reader(reader);
    xml.trim_text(true);

    let mut num_fmts: HashMap<usize, String> = HashMap::new();
    let mut fonts: Vec<Font> = Vec::new();
    let mut fills: Vec<Option<Fill>> = Vec::new();
    let mut borders: Vec<Border> = Vec::new();
    let mut xfs: Vec<RawXf> = Vec::new();

    let mut section = "";
    let mut font: Option<Font> = None;
    let mut fill: Option<Option<Fill>> = None;
    let mut solid = false;
    let mut border: Option<Border> = None;
    let mut side: Option<(String, BorderLine)> = None;
    let mut xf: Option<RawXf> = None;
    let mut buf = Vec::new();

    loop {
        let event = xml.read_event_into(&mut buf).map_err(|e| xml_error("styles.xml", e))?;
        let is_empty = matches!(event, Event::Empty(_));
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                match e.local_name().as_ref() {
                    b"numFmts" => section = "numFmts",
                    b"fonts" => section = "fonts",
                    b"fills" => section = "fills",
                    b"borders" => section = "borders",
                    b"cellXfs" => section = "cellXfs",
                    b"cellStyleXfs" | b"dxfs" | b"cellStyles" => section = "",
                    b"numFmt" if section == "numFmts" => {
                        let id = attr_usize(e, b"numFmtId");
                        if let (Some(id), Some(code)) = (id, attr(e, b"formatCode")) {
                            num_fmts.insert(id, code);
                        }
                    }
                    b"font" if section == "fonts" => {
                        font = Some(Font::default());
                        if is_empty {
                            fonts.push(Font::default());
                            font = None;
                        }
                    }
                    b"b" if font.is_some() => {
                        if let Some(f) = font.as_mut() {
                            f.bold = attr(e, b"val").map_or(true, |v| v != "0" && v != "false");
                        }
                    }
                    b"i" if font.is_some() => {
                        if let Some(f) = font.as_mut() {
                            f.italic = attr(e, b"val").map_or(true, |v| v != "0" && v != "false");
                        }
                    }
                    b"color" if font.is_some() => {
                        if let Some(f) = font.as_mut() {
                            f.color = attr(e, b"rgb").and_then(|v| Rgb::from_hex(&v));
                        }
                    }
                    b"fill" if section == "fills" => {
                        fill = Some(None);
                        solid = false;
                        if is_empty {
                            fills.push(None);
                            fill = None;
                        }
                    }
                    b"patternFill" if fill.is_some() => {
                        solid = attr(e, b"patternType").as_deref() == Some("solid");
                    }
                    b"fgColor" if fill.is_some() && solid => {
                        if let Some(color) = attr(e, b"rgb").and_then(|v| Rgb::from_hex(&v)) {
                            fill = Some(Some(Fill { color }));
                        }
                    }
                    b"border" if section == "borders" => {
                        border = Some(Border::default());
                        if is_empty {
                            borders.push(Border::default());
                            border = None;
                        }
                    }
                    name @ (b"left" | b"right" | b"top" | b"bottom") if border.is_some() => {
                        let line = attr(e, b"style")
                            .map_or(BorderLine::None, |s| BorderLine::from_ooxml(&s));
                        let side_name = String::from_utf8_lossy(name).into_owned();
                        if is_empty {
                            if let Some(b) = border.as_mut() {
                                set_side(b, &side_name, line);
                            }
                        } else {
                            side = Some((side_name, line));
                        }
                    }
                    b"xf" if section == "cellXfs" => {
                        let raw = RawXf {
                            num_fmt: attr_usize(e, b"numFmtId").unwrap_or(0),
                            font: attr_usize(e, b"fontId").unwrap_or(0),
                            fill: attr_usize(e, b"fillId").unwrap_or(0),
                            border: attr_usize(e, b"borderId").unwrap_or(0),
                            alignment: Alignment::default(),
                        };
                        if is_empty {
                            xfs.push(raw);
                        } else {
                            xf = Some(raw);
                        }
                    }
                    b"alignment" if xf.is_some() => {
                        if let Some(x) = xf.as_mut() {
                            x.alignment = Alignment {
                                horizontal: attr(e, b"horizontal").and_then(|h| match h.as_str() {
                                    "left" => Some(HAlign::Left),
                                    "center" | "centerContinuous" => Some(HAlign::Center),
                                    "right" => Some(HAlign::Right),
                                    _ => None,
                                }),
                                vertical: attr(e, b"vertical").and_then(|v| match v.as_str() {
                                    "top" => Some(VAlign::Top),
                                    "center" => Some(VAlign::Center),
                                    "bottom" => Some(VAlign::Bottom),
                                    _ => None,
                                }),
                                wrap: attr(e, b"wrapText").is_some_and(|w| w == "1" || w == "true"),
                            };
                        }
                    }
                    _ => {}
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"font" => {
                    if let Some(f) = font.take() {
                        fonts.push(f);
                    }
                }
                b"fill" => {
                    if let Some(f) = fill.take() {
                        fills.push(f);
                    }
                }
                b"left" | b"right" | b"top" | b"bottom" => {
                    if let (Some((name, line)), Some(b)) = (side.take(), border.as_mut()) {
                        set_side(b, &name, line);
                    }
                }
                b"border" => {
                    if let Some(b) = border.take() {
                        borders.push(b);
                    }
                }
                b"xf" => {
                    if let Some(x) = xf.take() {
                        xfs.push(x);
                    }
                }
                b"numFmts" | b"fonts" | b"fills" | b"borders" | b"cellXfs" => section = "",
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        drop(event);
        buf.clear();
    }

    Ok(xfs
        .into_iter()
        .map(|x| CellStyle {
            fill: fills.get(x.fill).copied().flatten(),
            font: fonts.get(x.font).cloned().unwrap_or_default(),
            border: borders.get(x.border).copied().unwrap_or_default(),
            alignment: x.alignment,
            number_format: num_fmts
                .get(&x.num_fmt)
                .cloned()
                .or_else(|| builtin_num_format(x.num_fmt).map(str::to_string)),
        })
        .collect())
}

fn set_side(border: &mut Border, side: &str, line: BorderLine) {
    match side {
        "left" => border.left = line,
        "right" => border.right = line,
        "top" => border.top = line,
        "bottom" => border.bottom = line,
        _ => {}
    }
}

/// Built-in number formats that are not declared in styles.xml
fn builtin_num_format(id: usize) -> Option<&'static str> {
    match id {
        1 => Some("0"),
        2 => Some("0.00"),
        3 => Some("#,##0"),
        4 => Some("#,##0.00"),
        9 => Some("0%"),
        10 => Some("0.00%"),
        14 => Some("mm-dd-yy"),
        22 => Some("m/d/yy h:mm"),
        49 => Some("@"),
        _ => None,
    }
}

//==============================================================================
// Worksheet cells
//==============================================================================

/// (row, col, xf index) for every cell with a style attribute
fn parse_cell_styles<R: BufRead>(reader: R) -> EngineResult<Vec<(u32, u16, usize)>> {
    let mut xml = Reader::from_reader(reader);
    xml.trim_text(true);

    let mut cells = Vec::new();
    let mut buf = Vec::new();
    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e) | Event::Empty(ref e)) if e.local_name().as_ref() == b"c" => {
                let (Some(reference), Some(xf)) = (attr(e, b"r"), attr_usize(e, b"s")) else {
                    continue;
                };
                if xf == 0 {
                    continue;
                }
                if let Some((row, col)) = parse_cell_ref(&reference) {
                    cells.push((row, col, xf));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("worksheet", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(cells)
}

/// `B3` → zero-based (2, 1)
pub fn parse_cell_ref(reference: &str) -> Option<(u32, u16)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    let row: u32 = digits.parse().ok()?;
    if row == 0 || col == 0 {
        return None;
    }
    Some((row - 1, u16::try_from(col - 1).ok()?))
}
