///! .map text format parser

use glam::DVec3;

use super::{Brush, BrushFace, Entity, Map};

/// Map parsing error
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum MapParseError {
    /// Text ended in the middle of an entity
    #[error("unexpected end of file")]
    UnexpectedEnd,

    /// Number expected
    #[error("line {line}: can't parse number from \"{token}\"")]
    InvalidNumber {
        /// Source line
        line: usize,

        /// Token number parsed from
        token: String,
    },

    /// Key or value isn't quoted
    #[error("line {line}: invalid property {key} {value}")]
    InvalidProperty {
        /// Source line
        line: usize,

        /// Potential key token
        key: String,

        /// Potential value token
        value: String,
    },

    /// Some other token expected
    #[error("line {line}: unexpected token \"{actual}\", expected \"{expected}\"")]
    UnexpectedToken {
        /// Source line
        line: usize,

        /// Actual token
        actual: String,

        /// Expected token
        expected: &'static str,
    },
}

/// Token with the line it starts at
#[derive(Copy, Clone, Debug)]
struct Token<'t> {
    /// Token text, quoted strings keep their quotes
    text: &'t str,

    /// 1-based line number
    line: usize,
}

/// Split text into tokens, `//` comments are dropped
fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut rest = text;

    while let Some(start) = rest.find(|c: char| !c.is_whitespace()) {
        line += rest[..start].matches('\n').count();
        rest = &rest[start..];

        let length = if rest.starts_with("//") {
            let end = rest.find('\n').unwrap_or(rest.len());
            rest = &rest[end..];
            continue;
        } else if let Some(quoted) = rest.strip_prefix('"') {
            // unterminated string takes the rest of the text
            quoted.find('"').map(|end| end + 2).unwrap_or(rest.len())
        } else {
            rest.find(char::is_whitespace).unwrap_or(rest.len())
        };

        tokens.push(Token { text: &rest[..length], line });
        line += rest[..length].matches('\n').count();
        rest = &rest[length..];
    }

    tokens
}

/// Cursor over the token list
struct Parser<'l, 't> {
    /// Tokens left
    tokens: &'l [Token<'t>],
}

impl<'l, 't> Parser<'l, 't> {
    /// Next token without consuming it
    fn peek(&self) -> Option<&'t str> {
        self.tokens.first().map(|token| token.text)
    }

    /// Consume any token
    fn next(&mut self) -> Result<Token<'t>, MapParseError> {
        let (token, rest) = self.tokens.split_first().ok_or(MapParseError::UnexpectedEnd)?;
        self.tokens = rest;
        Ok(*token)
    }

    /// Consume exactly `expected` token
    fn expect(&mut self, expected: &'static str) -> Result<(), MapParseError> {
        let token = self.next()?;

        if token.text == expected {
            Ok(())
        } else {
            Err(MapParseError::UnexpectedToken {
                line: token.line,
                actual: token.text.to_string(),
                expected,
            })
        }
    }

    fn float(&mut self) -> Result<f64, MapParseError> {
        let token = self.next()?;

        token.text
            .parse::<f64>()
            .map_err(|_| MapParseError::InvalidNumber { line: token.line, token: token.text.to_string() })
    }

    /// Integer, consumed only if the next token is one
    fn optional_int(&mut self) -> Option<i64> {
        let value = self.peek()?.parse::<i64>().ok()?;
        self.tokens = &self.tokens[1..];
        Some(value)
    }

    /// `( x y z )` point
    fn point(&mut self) -> Result<DVec3, MapParseError> {
        self.expect("(")?;
        let point = DVec3::new(self.float()?, self.float()?, self.float()?);
        self.expect(")")?;

        Ok(point)
    }

    fn brush_face(&mut self) -> Result<BrushFace, MapParseError> {
        let points = [self.point()?, self.point()?, self.point()?];
        let texture_name = self.next()?.text.to_string();

        let texture_offset_x = self.float()?;
        let texture_offset_y = self.float()?;
        let texture_rotation = self.float()?;
        let texture_scale_x = self.float()?;
        let texture_scale_y = self.float()?;

        // surface info goes all three or nothing
        let saved = self.tokens;
        let surface = match (self.optional_int(), self.optional_int(), self.optional_int()) {
            (Some(contents), Some(flags), Some(value)) => (contents as u32, flags as u32, value as i32),
            _ => {
                self.tokens = saved;
                (0, 0, 0)
            }
        };

        Ok(BrushFace {
            points,
            texture_name,
            texture_offset_x,
            texture_offset_y,
            texture_rotation,
            texture_scale_x,
            texture_scale_y,
            contents: surface.0,
            surface_flags: surface.1,
            value: surface.2,
        })
    }

    fn brush(&mut self) -> Result<Brush, MapParseError> {
        self.expect("{")?;

        let mut faces = Vec::new();
        while self.peek() == Some("(") {
            faces.push(self.brush_face()?);
        }

        self.expect("}")?;

        Ok(Brush { faces })
    }

    /// `"key" "value"` pair
    fn property(&mut self) -> Result<(String, String), MapParseError> {
        let key = self.next()?;
        let value = self.next()?;

        let unquote = |text: &'t str| {
            text.strip_prefix('"')
                .and_then(|text| text.strip_suffix('"'))
        };

        match (unquote(key.text), unquote(value.text)) {
            (Some(key), Some(value)) => Ok((key.to_string(), value.to_string())),
            _ => Err(MapParseError::InvalidProperty {
                line: key.line,
                key: key.text.to_string(),
                value: value.text.to_string(),
            }),
        }
    }

    fn entity(&mut self) -> Result<Entity, MapParseError> {
        self.expect("{")?;

        let mut entity = Entity::default();

        loop {
            match self.peek() {
                Some("{") => entity.brushes.push(self.brush()?),
                Some("}") => break,
                Some(_) => {
                    let (key, value) = self.property()?;
                    entity.set(&key, value);
                }
                None => return Err(MapParseError::UnexpectedEnd),
            }
        }

        self.expect("}")?;

        Ok(entity)
    }
}

impl Map {
    /// Parse map (or entity string) from text
    pub fn parse(text: &str) -> Result<Map, MapParseError> {
        let tokens = tokenize(text);
        let mut parser = Parser { tokens: &tokens };
        let mut entities = Vec::new();

        while parser.peek().is_some() {
            entities.push(parser.entity()?);
        }

        Ok(Map { entities })
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::*;

    const BOX_MAP: &str = r#"
// test map
{
"classname" "worldspawn"
"message" "box"
{
( 0 0 64 ) ( 0 64 64 ) ( 64 0 64 ) tex_common/grey 0 0 0 1 1
( 0 0 0 ) ( 64 0 0 ) ( 0 64 0 ) tex_common/grey 0 0 0 1 1 1 0 0
}
}
{
"classname" "light"
"origin" "32 32 32"
}
"#;

    #[test]
    fn parses_entities_and_brushes() {
        let map = Map::parse(BOX_MAP).unwrap();

        assert_eq!(map.entities.len(), 2);
        assert_eq!(map.entities[0].classname(), "worldspawn");
        assert_eq!(map.entities[0].brushes.len(), 1);

        let faces = &map.entities[0].brushes[0].faces;
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].points[1], DVec3::new(0.0, 64.0, 64.0));
        assert_eq!(faces[0].contents, 0);
        assert_eq!(faces[1].contents, 1);
        assert_eq!(faces[1].texture_name, "tex_common/grey");

        assert_eq!(map.entities[1].vector("origin"), DVec3::splat(32.0));
    }

    #[test]
    fn values_may_contain_spaces() {
        let map = Map::parse("{ \"message\" \"hello, world\" \"classname\" \"worldspawn\" }").unwrap();

        assert_eq!(map.entities[0].get("message"), Some("hello, world"));
    }

    #[test]
    fn partial_surface_info_is_ignored() {
        let map = Map::parse("{ { ( 0 0 0 ) ( 1 0 0 ) ( 0 1 0 ) tex 0 0 0 1 1 1 2 } }");

        // two trailing integers are neither surface info nor the next side
        assert!(matches!(map, Err(MapParseError::UnexpectedToken { expected: "}", .. })));
    }

    #[test]
    fn reports_broken_vector() {
        let result = Map::parse("{ \"classname\" \"worldspawn\"\n{ ( 0 0 x ) } }");

        assert_eq!(result.unwrap_err(), MapParseError::InvalidNumber { line: 2, token: "x".to_string() });
    }

    #[test]
    fn reports_missing_brace() {
        assert_eq!(
            Map::parse("{ \"classname\" \"worldspawn\"").unwrap_err(),
            MapParseError::UnexpectedEnd
        );
    }
}

// parser.rs
