//! Parser for GenConfig register map exports.
//!
//! The export is a loosely formatted text report. Two kinds of section matter:
//!
//! * register tables, introduced by a `Register(s)  Com.Obj.  Name ...` header
//!   and closed by a blank line;
//! * custom type blocks (`List#n` enumerations and `Binary#n` bit names),
//!   each framed by dash rules around a `Value  Name` or `Bit  Name` header.
//!
//! Everything else (banners, protection tables) is skipped. Scanning stops
//! at the `Table#` interpolation tables.

use log::{debug, info};
use std::collections::{HashMap, HashSet};

use super::custom_types::{CustomTypeKind, CustomTypeTable};
use super::definition::{Encoding, RegisterDefinition, Scale};
use super::register_catalog::{RegisterCatalog, RegisterGroup};
use crate::utils::error::{ParseError, TypeError};
use crate::utils::text::{is_rule_line, sanitize_unit};

/// First holding register reference (`4x` notation) mapped to address 0.
pub const DEFAULT_REGISTER_BASE: u32 = 40001;

const REGISTER_HEADER: &str = "Register(s)";
const TABLE_SECTION_PREFIX: &str = "Table#";
const TAB_WIDTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Register,
    CommObj,
    Name,
    Unit,
    Type,
    Len,
    Dec,
    Scale,
    Min,
    Max,
    Group,
    Other,
}

impl Column {
    fn from_header(word: &str) -> Self {
        match word.to_ascii_lowercase().as_str() {
            "register(s)" | "register" | "registers" => Column::Register,
            "com.obj." | "com.obj" | "comm.obj." => Column::CommObj,
            "name" => Column::Name,
            "dim" | "unit" | "units" => Column::Unit,
            "type" => Column::Type,
            "len" => Column::Len,
            "dec" => Column::Dec,
            "scale" => Column::Scale,
            "min" => Column::Min,
            "max" => Column::Max,
            "group" => Column::Group,
            _ => Column::Other,
        }
    }

    /// Numeric columns are printed flush right under their header word.
    fn right_aligned(self) -> bool {
        matches!(
            self,
            Column::Len | Column::Dec | Column::Scale | Column::Min | Column::Max
        )
    }
}

/// A whitespace-delimited word and its column span within the line, with
/// tabs expanded to stops every [`TAB_WIDTH`] columns.
struct Word<'a> {
    start: usize,
    end: usize,
    text: &'a str,
}

fn words(line: &str) -> Vec<Word<'_>> {
    let mut out = Vec::new();
    let mut open: Option<(usize, usize)> = None;
    let mut col = 0;
    for (byte, ch) in line.char_indices() {
        if ch.is_whitespace() {
            if let Some((start, from)) = open.take() {
                out.push(Word {
                    start,
                    end: col,
                    text: &line[from..byte],
                });
            }
        } else if open.is_none() {
            open = Some((col, byte));
        }
        col = match ch {
            '\t' => (col / TAB_WIDTH + 1) * TAB_WIDTH,
            _ => col + 1,
        };
    }
    if let Some((start, from)) = open {
        out.push(Word {
            start,
            end: col,
            text: &line[from..],
        });
    }
    out
}

/// Column spans of one register table, derived from its header line.
struct TableLayout {
    columns: Vec<(Column, usize)>,
}

impl TableLayout {
    fn from_header(header: &str) -> Self {
        let header_words = words(header);
        let mut columns: Vec<(Column, usize)> = Vec::with_capacity(header_words.len());
        for (i, word) in header_words.iter().enumerate() {
            let column = Column::from_header(word.text);
            let start = match i {
                0 => 0,
                _ if column.right_aligned() => header_words[i - 1].end,
                _ => word.start,
            };
            columns.push((column, start));
        }
        Self { columns }
    }

    fn has(&self, column: Column) -> bool {
        self.columns.iter().any(|(c, _)| *c == column)
    }

    /// Assign each word of `row` to the column its first character falls in.
    fn split(&self, row: &str) -> Row {
        let mut fields: Vec<(Column, String)> = self
            .columns
            .iter()
            .map(|(c, _)| (*c, String::new()))
            .collect();
        for word in words(row) {
            let slot = self
                .columns
                .partition_point(|(_, start)| *start <= word.start)
                .saturating_sub(1);
            let field = &mut fields[slot].1;
            if !field.is_empty() {
                field.push(' ');
            }
            field.push_str(word.text);
        }
        Row { fields }
    }
}

struct Row {
    fields: Vec<(Column, String)>,
}

impl Row {
    /// Field text, `None` when the table has no such column.
    fn get(&self, column: Column) -> Option<&str> {
        self.fields
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v.as_str())
    }

    /// Field text with the export's `-` placeholder treated as empty.
    fn value(&self, column: Column) -> Option<&str> {
        self.get(column).filter(|v| !v.is_empty() && *v != "-")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LimitSpec {
    Absent,
    Value(i64),
    /// Limit defined by another register, by communication object id.
    Ref(u32),
}

impl LimitSpec {
    fn literal(self) -> Option<i64> {
        match self {
            LimitSpec::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// A register row that passed field validation but still needs its type
/// resolved against the custom type table.
struct PendingRegister {
    line: usize,
    content: String,
    group: String,
    name: String,
    reference: u32,
    address: u16,
    count: u16,
    type_keyword: String,
    scale: Scale,
    unit: String,
    comm_obj: Option<u32>,
    min: LimitSpec,
    max: LimitSpec,
}

/// Turns export text into a [`RegisterCatalog`].
#[derive(Debug, Clone)]
pub struct RegisterCatalogParser {
    register_base: u32,
}

impl Default for RegisterCatalogParser {
    fn default() -> Self {
        Self {
            register_base: DEFAULT_REGISTER_BASE,
        }
    }
}

impl RegisterCatalogParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different reference for protocol address 0.
    pub fn with_register_base(register_base: u32) -> Self {
        Self { register_base }
    }

    pub fn register_base(&self) -> u32 {
        self.register_base
    }

    /// Parse raw export bytes. Bytes that are not UTF-8 (the tool writes the
    /// degree sign in Latin-1) become replacement characters, which unit
    /// sanitization then drops.
    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<RegisterCatalog, ParseError> {
        self.parse(&String::from_utf8_lossy(bytes))
    }

    /// Parse a whole export. Either every section is valid and a complete
    /// catalog is returned, or the first problem is reported.
    pub fn parse(&self, text: &str) -> Result<RegisterCatalog, ParseError> {
        let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
        let lines: Vec<&str> = text.lines().map(|l| l.trim_end_matches('\r')).collect();
        let mut pending = Vec::new();
        let mut types = CustomTypeTable::new();

        // First line not yet claimed by a register table or type block.
        let mut floor = 0;
        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            if line.trim_start().starts_with(TABLE_SECTION_PREFIX) {
                debug!("Stopping at line {}: {}", i + 1, line.trim());
                break;
            }
            if is_register_header(line) {
                i = self.read_register_table(&lines, floor, i, &mut pending)?;
                floor = i;
                continue;
            }
            if let Some((name_at, header_at, kind)) = detect_type_block(&lines, i)? {
                i = read_type_block(&lines, name_at, header_at, kind, &mut types)?;
                floor = i;
                continue;
            }
            i += 1;
        }

        if pending.is_empty() {
            return Err(ParseError::format(
                1,
                lines.first().copied().unwrap_or_default(),
                "no register table found",
            ));
        }

        let catalog = assemble(pending, types)?;
        info!(
            "📋 Parsed {} registers in {} groups with {} custom types",
            catalog.len(),
            catalog.groups().len(),
            catalog.custom_types().len()
        );
        Ok(catalog)
    }

    /// Read the table whose header sits at `header_at`; returns the index of
    /// the blank line that closes it. A table without a `Group` column takes
    /// its group from a title in `lines[floor..header_at]`.
    fn read_register_table(
        &self,
        lines: &[&str],
        floor: usize,
        header_at: usize,
        pending: &mut Vec<PendingRegister>,
    ) -> Result<usize, ParseError> {
        let header = lines[header_at];
        let layout = TableLayout::from_header(header);
        for required in [Column::Name, Column::Type] {
            if !layout.has(required) {
                return Err(ParseError::format(
                    header_at + 1,
                    header,
                    format!("register table header lacks a {:?} column", required),
                ));
            }
        }
        let title = if layout.has(Column::Group) {
            None
        } else {
            let title = section_title(&lines[floor..header_at]).ok_or_else(|| {
                ParseError::format(
                    header_at + 1,
                    header,
                    "register table has no group column and no title",
                )
            })?;
            Some(title)
        };

        let mut i = header_at + 1;
        let before = pending.len();
        loop {
            let Some(line) = lines.get(i) else {
                return Err(ParseError::format(
                    header_at + 1,
                    header,
                    "unterminated register table",
                ));
            };
            if line.trim().is_empty() {
                break;
            }
            if !is_rule_line(line, '-') && !is_rule_line(line, '=') {
                pending.push(self.parse_register_row(&layout, title.as_deref(), i + 1, line)?);
            }
            i += 1;
        }
        debug!(
            "Register table at line {}: {} rows",
            header_at + 1,
            pending.len() - before
        );
        Ok(i)
    }

    fn parse_register_row(
        &self,
        layout: &TableLayout,
        title: Option<&str>,
        line: usize,
        content: &str,
    ) -> Result<PendingRegister, ParseError> {
        let fail = |reason: String| ParseError::format(line, content, reason);
        let row = layout.split(content);

        let register = row.get(Column::Register).unwrap_or_default();
        let (reference, range_count) = parse_reference(register).map_err(fail)?;

        let len_count = match row.value(Column::Len) {
            None => None,
            Some(len) => {
                let bytes = parse_digits(len)
                    .filter(|b| *b > 0)
                    .ok_or_else(|| fail(format!("malformed length '{}'", len)))?;
                Some(bytes.div_ceil(2))
            }
        };
        let count = match (range_count, len_count) {
            (Some(a), Some(b)) if a != b => {
                return Err(fail(format!(
                    "register range covers {} register(s) but length implies {}",
                    a, b
                )))
            }
            (Some(a), _) => a,
            (None, Some(b)) => b,
            (None, None) => 1,
        };
        let count = u16::try_from(count)
            .map_err(|_| fail(format!("register count {} is too large", count)))?;

        if reference < self.register_base {
            return Err(fail(format!(
                "reference {} is below the register base {}",
                reference, self.register_base
            )));
        }
        let offset = reference - self.register_base;
        let last = offset as u64 + count as u64 - 1;
        if last > u16::MAX as u64 {
            return Err(fail(format!(
                "reference {} with {} register(s) is outside the address space",
                reference, count
            )));
        }
        let address = offset as u16;

        let name = row
            .get(Column::Name)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| fail("missing register name".to_string()))?
            .to_string();
        let type_keyword = row
            .value(Column::Type)
            .ok_or_else(|| fail("missing register type".to_string()))?
            .to_string();

        let group = match row.get(Column::Group) {
            Some(g) if !g.is_empty() => g.to_string(),
            Some(_) => return Err(fail("missing register group".to_string())),
            None => title
                .map(str::to_string)
                .ok_or_else(|| fail("register table has neither a group column nor a title".to_string()))?,
        };

        let scale = match (row.value(Column::Dec), row.value(Column::Scale)) {
            (Some(_), Some(_)) => {
                return Err(fail("both decimals and scale are given".to_string()))
            }
            (Some(dec), None) => match dec.parse::<i8>() {
                Ok(d) if (-9..=9).contains(&d) => Scale::Decimals(d),
                _ => return Err(fail(format!("malformed decimals '{}'", dec))),
            },
            (None, Some(factor)) => match factor.parse::<f64>() {
                Ok(k) if k.is_finite() && k > 0.0 => Scale::Factor(k),
                _ => return Err(fail(format!("malformed scale '{}'", factor))),
            },
            (None, None) => Scale::Unit,
        };

        let unit = row.value(Column::Unit).map(sanitize_unit).unwrap_or_default();

        let comm_obj = match row.value(Column::CommObj) {
            None => None,
            Some(obj) => Some(
                parse_digits(obj)
                    .ok_or_else(|| fail(format!("malformed communication object '{}'", obj)))?,
            ),
        };

        let min = parse_limit(row.value(Column::Min)).map_err(fail)?;
        let max = parse_limit(row.value(Column::Max)).map_err(fail)?;

        Ok(PendingRegister {
            line,
            content: content.to_string(),
            group,
            name,
            reference,
            address,
            count,
            type_keyword,
            scale,
            unit,
            comm_obj,
            min,
            max,
        })
    }
}

fn is_register_header(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .is_some_and(|w| w.eq_ignore_ascii_case(REGISTER_HEADER))
}

/// Last line of `preceding` that is neither blank nor a rule.
fn section_title(preceding: &[&str]) -> Option<String> {
    preceding
        .iter()
        .rev()
        .map(|l| l.trim())
        .find(|l| !l.is_empty() && !is_rule_line(l, '-') && !is_rule_line(l, '='))
        .map(|l| l.trim_end_matches(':').trim().to_string())
        .filter(|l| !l.is_empty())
}

fn parse_digits(s: &str) -> Option<u32> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// `40003`, `40013-40014` or `40013-40014 ( 2)`; returns the first reference
/// and the register count when the field states one.
fn parse_reference(field: &str) -> Result<(u32, Option<u32>), String> {
    let compact: String = field.chars().filter(|c| !c.is_whitespace()).collect();
    let bad = || format!("address '{}' is not a non-negative integer", field);

    let (range, stated) = match compact.split_once('(') {
        Some((range, rest)) => {
            let inner = rest.strip_suffix(')').ok_or_else(bad)?;
            (range, Some(parse_digits(inner).ok_or_else(bad)?))
        }
        None => (compact.as_str(), None),
    };

    let (start, spanned) = match range.split_once('-') {
        Some((start, end)) => {
            let start = parse_digits(start).ok_or_else(bad)?;
            let end = parse_digits(end).ok_or_else(bad)?;
            if end < start {
                return Err(format!("register range '{}' ends before it starts", field));
            }
            let span = (end - start)
                .checked_add(1)
                .ok_or_else(|| format!("register range '{}' is too large", field))?;
            (start, Some(span))
        }
        None => (parse_digits(range).ok_or_else(bad)?, None),
    };

    match (spanned, stated) {
        (Some(a), Some(b)) if a != b => Err(format!(
            "register range '{}' spans {} register(s), not {}",
            field, a, b
        )),
        (Some(0), _) | (_, Some(0)) => Err(format!("register range '{}' is empty", field)),
        (Some(a), _) => Ok((start, Some(a))),
        (None, b) => Ok((start, b)),
    }
}

fn parse_limit(field: Option<&str>) -> Result<LimitSpec, String> {
    let Some(field) = field else {
        return Ok(LimitSpec::Absent);
    };
    if let Some(obj) = field.strip_prefix('*') {
        return parse_digits(obj)
            .map(LimitSpec::Ref)
            .ok_or_else(|| format!("malformed limit reference '{}'", field));
    }
    field
        .parse::<i64>()
        .map(LimitSpec::Value)
        .map_err(|_| format!("malformed limit '{}'", field))
}

/// Recognise a custom type block opening at `at`: dash rule, type name,
/// optional blank lines, `Value  Name` / `Bit  Name`, dash rule. Returns the
/// name and header line indices.
fn detect_type_block(
    lines: &[&str],
    at: usize,
) -> Result<Option<(usize, usize, CustomTypeKind)>, ParseError> {
    if !is_rule_line(lines[at], '-') {
        return Ok(None);
    }
    let name_at = at + 1;
    match lines.get(name_at) {
        Some(name) if !name.trim().is_empty() && !is_rule_line(name, '-') => {}
        _ => return Ok(None),
    }
    let mut header_at = name_at + 1;
    while lines.get(header_at).is_some_and(|l| l.trim().is_empty()) {
        header_at += 1;
    }
    let Some(header) = lines.get(header_at) else {
        return Ok(None);
    };
    let kind = match header
        .split_whitespace()
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .as_slice()
    {
        [first, second] if first == "value" && second == "name" => CustomTypeKind::Enumeration,
        [first, second] if first == "bit" && second == "name" => CustomTypeKind::BitNames,
        _ => return Ok(None),
    };
    match lines.get(header_at + 1) {
        Some(rule) if is_rule_line(rule, '-') => Ok(Some((name_at, header_at, kind))),
        _ => Err(ParseError::format(
            header_at + 1,
            header,
            "unterminated custom type header",
        )),
    }
}

/// Read the entries of a type block; returns the index of the line that
/// ended it, which may open the next block.
fn read_type_block(
    lines: &[&str],
    name_at: usize,
    header_at: usize,
    kind: CustomTypeKind,
    types: &mut CustomTypeTable,
) -> Result<usize, ParseError> {
    let type_id = lines[name_at].trim().to_string();
    let mut entries: Vec<(u32, String)> = Vec::new();
    let mut seen = HashSet::new();

    let mut i = header_at + 2;
    while let Some(line) = lines.get(i) {
        let trimmed = line.trim();
        if trimmed.is_empty()
            || is_rule_line(line, '-')
            || trimmed.starts_with(TABLE_SECTION_PREFIX)
        {
            break;
        }
        let (code, label) = trimmed
            .split_once(char::is_whitespace)
            .unwrap_or((trimmed, ""));
        let code = parse_digits(code).ok_or_else(|| {
            ParseError::format(i + 1, line, format!("malformed code in custom type '{}'", type_id))
        })?;
        let label = label.trim();
        if label.is_empty() {
            return Err(ParseError::format(i + 1, line, "missing label"));
        }
        if !seen.insert(code) {
            return Err(ParseError::Type {
                line: i + 1,
                source: TypeError::DuplicateCode {
                    type_id,
                    code,
                },
            });
        }
        entries.push((code, label.to_string()));
        i += 1;
    }

    let count = entries.len();
    let defined = match kind {
        CustomTypeKind::Enumeration => types.define(type_id.clone(), entries),
        CustomTypeKind::BitNames => types.define_bits(type_id.clone(), entries),
    };
    defined.map_err(|source| ParseError::Type {
        line: name_at + 1,
        source,
    })?;
    debug!("Custom type '{}' ({:?}): {} entries", type_id, kind, count);
    Ok(i)
}

fn resolve_encoding(keyword: &str, types: &CustomTypeTable) -> Result<Encoding, String> {
    if keyword.contains('#') {
        let custom = types
            .get(keyword)
            .ok_or_else(|| format!("undeclared custom type '{}'", keyword))?;
        return Ok(match custom.kind() {
            CustomTypeKind::Enumeration => Encoding::Enumeration {
                type_id: keyword.to_string(),
            },
            CustomTypeKind::BitNames => Encoding::Bitfield {
                names: Some(keyword.to_string()),
            },
        });
    }
    match keyword.to_ascii_lowercase().as_str() {
        "integer" | "signed" | "int" => Ok(Encoding::Signed),
        "unsigned" | "uint" => Ok(Encoding::Unsigned),
        "float" | "real" => Ok(Encoding::Float),
        "binary" | "bitfield" => Ok(Encoding::Bitfield { names: None }),
        "string0" | "string" | "char" => Ok(Encoding::Text),
        "time" | "date" => Ok(Encoding::Bcd),
        _ => Err(format!("unknown register type '{}'", keyword)),
    }
}

/// Resolve every pending row in declaration order and publish the catalog.
fn assemble(
    pending: Vec<PendingRegister>,
    types: CustomTypeTable,
) -> Result<RegisterCatalog, ParseError> {
    // First declaration wins when an object id appears twice.
    let mut literal_limits: HashMap<u32, (Option<i64>, Option<i64>)> = HashMap::new();
    for p in &pending {
        if let Some(obj) = p.comm_obj {
            literal_limits
                .entry(obj)
                .or_insert((p.min.literal(), p.max.literal()));
        }
    }
    let resolve_limit = |limit: LimitSpec, pick: fn(&(Option<i64>, Option<i64>)) -> Option<i64>| {
        match limit {
            LimitSpec::Absent => None,
            LimitSpec::Value(v) => Some(v),
            LimitSpec::Ref(obj) => literal_limits.get(&obj).and_then(pick),
        }
    };

    let mut groups: Vec<RegisterGroup> = Vec::new();
    let mut group_slots: HashMap<String, usize> = HashMap::new();

    for p in pending {
        let encoding = resolve_encoding(&p.type_keyword, &types)
            .map_err(|reason| ParseError::format(p.line, &p.content, reason))?;
        if !encoding.accepts_count(p.count) {
            return Err(ParseError::format(
                p.line,
                &p.content,
                format!("{} register(s) do not fit a {} register", p.count, encoding),
            ));
        }

        let definition = RegisterDefinition {
            group: p.group.clone(),
            name: p.name,
            reference: p.reference,
            address: p.address,
            register_count: p.count,
            encoding,
            scale: p.scale,
            unit: p.unit,
            comm_obj: p.comm_obj,
            min: resolve_limit(p.min, |l| l.0),
            max: resolve_limit(p.max, |l| l.1),
            line: p.line,
        };

        let slot = *group_slots.entry(p.group.clone()).or_insert_with(|| {
            groups.push(RegisterGroup::new(p.group.clone()));
            groups.len() - 1
        });
        let group = &mut groups[slot];
        if let Err(rejected) = group.push(definition) {
            let first_line = group.get(&rejected.name).map_or(0, |d| d.line);
            return Err(ParseError::DuplicateRegister {
                line: rejected.line,
                group: rejected.group,
                name: rejected.name,
                first_line,
            });
        }
    }

    Ok(RegisterCatalog::from_parts(groups, types))
}
