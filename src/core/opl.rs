//! OPL ("object per line") text format
//!
//! Every line holds one object: a type letter directly followed by the id,
//! then space separated fields each introduced by a single letter. Spaces,
//! commas, `=`, `@` and `%` inside values are written as `%<hex>%`.

use std::fmt::Write as _;
use std::io::{BufRead, BufReader, Lines, Read};

use butterfly_common::{
    Changeset, Element, EntityKind, EntityMask, Error, Location, Member, Meta, Node, Relation,
    Result, Tags, Way, WayNode,
};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::core::source::{FileFormat, Header, RecordReader};

/// Reader over OPL text; OPL files carry no header
pub struct OplReader<R: Read> {
    lines: Lines<BufReader<R>>,
    mask: EntityMask,
    header: Header,
    line_no: usize,
    finished: bool,
}

impl<R: Read> OplReader<R> {
    pub fn new(reader: R, mask: EntityMask) -> Self {
        OplReader {
            lines: BufReader::new(reader).lines(),
            mask,
            header: Header::empty(FileFormat::Opl),
            line_no: 0,
            finished: false,
        }
    }
}

impl<R: Read> Iterator for OplReader<R> {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
                None => {
                    self.finished = true;
                    return None;
                }
            };
            self.line_no += 1;

            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.chars().next().and_then(EntityKind::from_letter) {
                Some(kind) if !self.mask.contains(kind) => continue,
                _ => {}
            }

            let parsed = parse_line(line, self.line_no);
            if parsed.is_err() {
                self.finished = true;
            }
            return Some(parsed);
        }
    }
}

impl<R: Read + Send> RecordReader for OplReader<R> {
    fn header(&self) -> &Header {
        &self.header
    }
}

#[derive(Default)]
struct Fields {
    meta: Meta,
    tags: Tags,
    x: Option<f64>,
    y: Option<f64>,
    max_x: Option<f64>,
    max_y: Option<f64>,
    nodes: Vec<WayNode>,
    members: Vec<Member>,
    num_changes: u32,
    num_comments: u32,
    created_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
}

/// Parse a single OPL line into a record
pub fn parse_line(line: &str, line_no: usize) -> Result<Element> {
    let mut tokens = line.split_ascii_whitespace();
    let head = tokens
        .next()
        .ok_or_else(|| Error::parse(line_no, "empty line"))?;

    let mut chars = head.chars();
    let kind = chars
        .next()
        .and_then(EntityKind::from_letter)
        .ok_or_else(|| Error::parse(line_no, format!("unknown object type in '{head}'")))?;
    let id: i64 = chars
        .as_str()
        .parse()
        .map_err(|_| Error::parse(line_no, format!("invalid id in '{head}'")))?;

    let mut fields = Fields::default();
    for token in tokens {
        let mut chars = token.chars();
        let Some(letter) = chars.next() else { continue };
        let value = chars.as_str();
        parse_field(kind, letter, value, &mut fields)
            .map_err(|message| Error::parse(line_no, message))?;
    }

    let location = match (fields.x, fields.y) {
        (Some(x), Some(y)) => Location::from_degrees(x, y),
        _ => Location::UNDEFINED,
    };

    Ok(match kind {
        EntityKind::Node => Element::Node(Node {
            id,
            meta: fields.meta,
            location,
            tags: fields.tags,
        }),
        EntityKind::Way => Element::Way(Way {
            id,
            meta: fields.meta,
            nodes: fields.nodes,
            tags: fields.tags,
        }),
        EntityKind::Relation => Element::Relation(Relation {
            id,
            meta: fields.meta,
            members: fields.members,
            tags: fields.tags,
        }),
        EntityKind::Changeset => {
            let bbox = match (fields.max_x, fields.max_y) {
                (Some(x), Some(y)) if location.is_defined() => {
                    Some((location, Location::from_degrees(x, y)))
                }
                _ => None,
            };
            Element::Changeset(Changeset {
                id,
                created_at: fields.created_at,
                closed_at: fields.closed_at,
                num_changes: fields.num_changes,
                num_comments: fields.num_comments,
                uid: fields.meta.uid,
                user: fields.meta.user,
                bbox,
                tags: fields.tags,
            })
        }
        EntityKind::Area => {
            return Err(Error::parse(line_no, "areas cannot be read from OPL"));
        }
    })
}

fn parse_field(
    kind: EntityKind,
    letter: char,
    value: &str,
    fields: &mut Fields,
) -> std::result::Result<(), String> {
    let changeset = kind == EntityKind::Changeset;
    match letter {
        'v' => fields.meta.version = Some(parse_number(value, "version")?),
        'd' if changeset => fields.num_comments = parse_number(value, "comment count")?,
        'd' => {
            fields.meta.visible = match value {
                "V" => true,
                "D" => false,
                other => return Err(format!("invalid visibility '{other}'")),
            }
        }
        'c' => fields.meta.changeset = Some(parse_number(value, "changeset")?),
        't' => fields.meta.timestamp = parse_timestamp(value)?,
        'i' => fields.meta.uid = Some(parse_number(value, "uid")?),
        'u' => fields.meta.user = Some(unescape(value)?),
        'T' => fields.tags = parse_tags(value)?,
        'x' => fields.x = parse_coordinate(value)?,
        'y' => fields.y = parse_coordinate(value)?,
        'X' if changeset => fields.max_x = parse_coordinate(value)?,
        'Y' if changeset => fields.max_y = parse_coordinate(value)?,
        'k' if changeset => fields.num_changes = parse_number(value, "change count")?,
        's' if changeset => fields.created_at = parse_timestamp(value)?,
        'e' if changeset => fields.closed_at = parse_timestamp(value)?,
        'N' if kind == EntityKind::Way => fields.nodes = parse_way_nodes(value)?,
        'M' if kind == EntityKind::Relation => fields.members = parse_members(value)?,
        other => return Err(format!("unexpected field '{other}' for {kind}")),
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(value: &str, what: &str) -> std::result::Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("invalid {what} '{value}'"))
}

fn parse_coordinate(value: &str) -> std::result::Result<Option<f64>, String> {
    if value.is_empty() {
        return Ok(None);
    }
    parse_number(value, "coordinate").map(Some)
}

fn parse_timestamp(value: &str) -> std::result::Result<Option<DateTime<Utc>>, String> {
    if value.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|t| Some(t.with_timezone(&Utc)))
        .map_err(|e| format!("invalid timestamp '{value}': {e}"))
}

fn parse_tags(value: &str) -> std::result::Result<Tags, String> {
    let mut tags = Tags::new();
    for pair in value.split(',').filter(|p| !p.is_empty()) {
        let (k, v) = pair
            .split_once('=')
            .ok_or_else(|| format!("tag without '=' in '{pair}'"))?;
        tags.push(unescape(k)?, unescape(v)?);
    }
    Ok(tags)
}

fn parse_way_nodes(value: &str) -> std::result::Result<Vec<WayNode>, String> {
    value
        .split(',')
        .filter(|n| !n.is_empty())
        .map(|entry| {
            let rest = entry
                .strip_prefix('n')
                .ok_or_else(|| format!("invalid node reference '{entry}'"))?;
            // Locations on ways are written as n<id>x<lon>y<lat>
            let (id, location) = match rest.split_once('x') {
                Some((id, coords)) => {
                    let (x, y) = coords
                        .split_once('y')
                        .ok_or_else(|| format!("invalid node location in '{entry}'"))?;
                    let location = match (parse_coordinate(x)?, parse_coordinate(y)?) {
                        (Some(x), Some(y)) => Location::from_degrees(x, y),
                        _ => Location::UNDEFINED,
                    };
                    (id, location)
                }
                None => (rest, Location::UNDEFINED),
            };
            Ok(WayNode {
                id: parse_number(id, "node id")?,
                location,
            })
        })
        .collect()
}

fn parse_members(value: &str) -> std::result::Result<Vec<Member>, String> {
    value
        .split(',')
        .filter(|m| !m.is_empty())
        .map(|entry| {
            let mut chars = entry.chars();
            let kind = chars
                .next()
                .and_then(EntityKind::from_letter)
                .filter(|k| matches!(k, EntityKind::Node | EntityKind::Way | EntityKind::Relation))
                .ok_or_else(|| format!("invalid member type in '{entry}'"))?;
            let (id, role) = chars
                .as_str()
                .split_once('@')
                .ok_or_else(|| format!("member without role separator in '{entry}'"))?;
            Ok(Member {
                kind,
                id: parse_number(id, "member id")?,
                role: unescape(role)?,
            })
        })
        .collect()
}

/// Decode `%<hex>%` escapes
pub fn unescape(value: &str) -> std::result::Result<String, String> {
    if !value.contains('%') {
        return Ok(value.to_string());
    }
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find('%')
            .ok_or_else(|| format!("unterminated escape in '{value}'"))?;
        let code = u32::from_str_radix(&after[..end], 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| format!("invalid escape in '{value}'"))?;
        out.push(code);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Encode characters that would break OPL field splitting
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ' ' | ',' | '=' | '@' | '%') || c.is_control() {
            let _ = write!(out, "%{:x}%", c as u32);
        } else {
            out.push(c);
        }
    }
    out
}

fn format_coordinate(value: i32) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    let int = abs / 10_000_000;
    let frac = abs % 10_000_000;
    if frac == 0 {
        return format!("{sign}{int}");
    }
    let frac = format!("{frac:07}");
    format!("{sign}{int}.{}", frac.trim_end_matches('0'))
}

fn format_location(out: &mut String, location: Location) {
    if location.is_defined() {
        let _ = write!(
            out,
            " x{} y{}",
            format_coordinate(location.x()),
            format_coordinate(location.y())
        );
    } else {
        out.push_str(" x y");
    }
}

fn format_timestamp(t: &Option<DateTime<Utc>>) -> String {
    t.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

fn format_meta(out: &mut String, meta: &Meta) {
    let _ = write!(
        out,
        " v{} d{} c{} t{} i{} u{}",
        meta.version.unwrap_or(0),
        if meta.visible { 'V' } else { 'D' },
        meta.changeset.unwrap_or(0),
        format_timestamp(&meta.timestamp),
        meta.uid.unwrap_or(0),
        meta.user.as_deref().map(escape).unwrap_or_default(),
    );
}

fn format_tags(out: &mut String, tags: &Tags) {
    out.push_str(" T");
    let encoded: Vec<String> = tags
        .iter()
        .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
        .collect();
    out.push_str(&encoded.join(","));
}

/// Render a record as one OPL line (without trailing newline)
///
/// Areas have no OPL representation; they are written with their ring
/// counts (`R<outer>:<inner>`) for display purposes.
pub fn to_opl(element: &Element) -> String {
    let mut out = format!("{}{}", element.kind().letter(), element.id());
    match element {
        Element::Node(node) => {
            format_meta(&mut out, &node.meta);
            format_tags(&mut out, &node.tags);
            format_location(&mut out, node.location);
        }
        Element::Way(way) => {
            format_meta(&mut out, &way.meta);
            format_tags(&mut out, &way.tags);
            out.push_str(" N");
            let refs: Vec<String> = way
                .nodes
                .iter()
                .map(|n| {
                    if n.location.is_defined() {
                        format!(
                            "n{}x{}y{}",
                            n.id,
                            format_coordinate(n.location.x()),
                            format_coordinate(n.location.y())
                        )
                    } else {
                        format!("n{}", n.id)
                    }
                })
                .collect();
            out.push_str(&refs.join(","));
        }
        Element::Relation(relation) => {
            format_meta(&mut out, &relation.meta);
            format_tags(&mut out, &relation.tags);
            out.push_str(" M");
            let members: Vec<String> = relation
                .members
                .iter()
                .map(|m| format!("{}{}@{}", m.kind.letter(), m.id, escape(&m.role)))
                .collect();
            out.push_str(&members.join(","));
        }
        Element::Area(area) => {
            format_meta(&mut out, &area.meta);
            format_tags(&mut out, &area.tags);
            let (outer, inner) = area.num_rings();
            let _ = write!(out, " R{outer}:{inner}");
        }
        Element::Changeset(cs) => {
            let _ = write!(
                out,
                " k{} s{} e{} d{} i{} u{}",
                cs.num_changes,
                format_timestamp(&cs.created_at),
                format_timestamp(&cs.closed_at),
                cs.num_comments,
                cs.uid.unwrap_or(0),
                cs.user.as_deref().map(escape).unwrap_or_default(),
            );
            match cs.bbox {
                Some((min, max)) => {
                    format_location(&mut out, min);
                    let _ = write!(
                        out,
                        " X{} Y{}",
                        format_coordinate(max.x()),
                        format_coordinate(max.y())
                    );
                }
                None => out.push_str(" x y X Y"),
            }
            format_tags(&mut out, &cs.tags);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node() {
        let element = parse_line(
            "n17 v2 dV c42 t2021-03-04T05:06:07Z i5 uJohn%20%Doe Tamenity=bench,name=Old%2c%Oak x13.5 y-52.25",
            1,
        )
        .unwrap();
        let Element::Node(node) = element else {
            panic!("expected node");
        };
        assert_eq!(node.id, 17);
        assert_eq!(node.meta.version, Some(2));
        assert_eq!(node.meta.changeset, Some(42));
        assert_eq!(node.meta.user.as_deref(), Some("John Doe"));
        assert_eq!(node.tags.get("name"), Some("Old,Oak"));
        assert_eq!(node.location, Location::from_degrees(13.5, -52.25));
        assert_eq!(
            node.meta.timestamp.unwrap().to_rfc3339_opts(SecondsFormat::Secs, true),
            "2021-03-04T05:06:07Z"
        );
    }

    #[test]
    fn test_parse_way_with_and_without_locations() {
        let Element::Way(way) = parse_line("w3 Thighway=path Nn1,n2x1.5y2.5,n-3", 1).unwrap()
        else {
            panic!("expected way");
        };
        assert_eq!(way.node_ids().collect::<Vec<_>>(), vec![1, 2, -3]);
        assert!(!way.nodes[0].location.is_defined());
        assert_eq!(way.nodes[1].location, Location::from_degrees(1.5, 2.5));
    }

    #[test]
    fn test_parse_relation_members() {
        let Element::Relation(rel) =
            parse_line("r9 Ttype=multipolygon Mw1@outer,w2@inner,n4@,r5@sub%20%area", 1).unwrap()
        else {
            panic!("expected relation");
        };
        assert_eq!(rel.members.len(), 4);
        assert_eq!(rel.members[0].kind, EntityKind::Way);
        assert_eq!(rel.members[2].role, "");
        assert_eq!(rel.members[3].role, "sub area");
    }

    #[test]
    fn test_parse_changeset() {
        let Element::Changeset(cs) = parse_line(
            "c11 k3 s2020-01-01T00:00:00Z e d1 i7 ualice x1 y2 X3 Y4 Tcomment=fix",
            1,
        )
        .unwrap() else {
            panic!("expected changeset");
        };
        assert_eq!(cs.num_changes, 3);
        assert_eq!(cs.num_comments, 1);
        assert!(cs.is_open());
        assert_eq!(
            cs.bbox,
            Some((Location::from_degrees(1.0, 2.0), Location::from_degrees(3.0, 4.0)))
        );
    }

    #[test]
    fn test_parse_errors_carry_line_number() {
        match parse_line("n1 vX", 12) {
            Err(Error::Parse { line, message }) => {
                assert_eq!(line, 12);
                assert!(message.contains("version"));
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert!(parse_line("q1", 1).is_err());
        assert!(parse_line("a2 Tk=v", 1).is_err());
        assert!(parse_line("n1 Nn1", 1).is_err());
    }

    #[test]
    fn test_reader_skips_comments_and_masked_types() {
        let text = "# comment\n\nn1 x1 y1\nw2 Nn1\nr3 M\n";
        let reader = OplReader::new(text.as_bytes(), EntityMask::NODE | EntityMask::RELATION);
        let kinds: Vec<EntityKind> = reader.map(|e| e.unwrap().kind()).collect();
        assert_eq!(kinds, vec![EntityKind::Node, EntityKind::Relation]);
    }

    #[test]
    fn test_reader_stops_after_error() {
        let text = "n1\nn2 v?\nn3\n";
        let results: Vec<_> = OplReader::new(text.as_bytes(), EntityMask::ALL).collect();
        assert_eq!(results.len(), 2);
        assert!(results[1].is_err());
    }

    #[test]
    fn test_escape_unescape() {
        assert_eq!(escape("a b,c=d@e%"), "a%20%b%2c%c%3d%d%40%e%25%");
        assert_eq!(unescape(&escape("x y, z")).unwrap(), "x y, z");
        assert!(unescape("bad%41").is_err());
    }

    #[test]
    fn test_to_opl_reparses() {
        let line = "w5 v1 dV c2 t2020-05-06T07:08:09Z i3 ubob Thighway=primary,name=A%20%road Nn1,n2x-0.5y0.0000001";
        let element = parse_line(line, 1).unwrap();
        let written = to_opl(&element);
        assert_eq!(parse_line(&written, 1).unwrap(), element);
        assert!(written.contains("n2x-0.5y0.0000001"));
    }

    #[test]
    fn test_format_coordinate() {
        assert_eq!(format_coordinate(0), "0");
        assert_eq!(format_coordinate(-5_000_000), "-0.5");
        assert_eq!(format_coordinate(1_234_567_891), "123.4567891");
    }
}
