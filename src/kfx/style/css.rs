//! CSS stylesheet parsing.
//!
//! Only the selector forms a KFX style can express are kept: `tag`,
//! `.class`, `tag.class` and descendant chains of those. Everything else is
//! skipped with a warning.

use cssparser::{
    AtRuleParser, CowRcStr, DeclarationParser, ParseError, Parser, ParserInput, ParserState,
    QualifiedRuleParser, RuleBodyItemParser, RuleBodyParser, StyleSheetParser, Token,
};

use super::units::{CssUnit, Length, pack_color};

/// A parsed stylesheet.
#[derive(Debug, Default, Clone)]
pub struct Stylesheet {
    pub rules: Vec<CssRule>,
}

/// One rule: every supported selector of its selector list shares the block.
#[derive(Debug, Clone)]
pub struct CssRule {
    pub selectors: Vec<Selector>,
    pub declarations: Vec<Declaration>,
}

/// `tag`, `.class` or `tag.class`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    pub tag: Option<String>,
    pub class: Option<String>,
}

impl Compound {
    pub fn is_empty(&self) -> bool {
        self.tag.is_none() && self.class.is_none()
    }

    /// Class name if present, else the tag.
    pub fn base_name(&self) -> Option<&str> {
        self.class.as_deref().or(self.tag.as_deref())
    }
}

/// A descendant chain; the last compound is the subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub ancestors: Vec<Compound>,
    pub subject: Compound,
}

impl Selector {
    /// Name of the style this selector defines.
    pub fn style_name(&self) -> Option<&str> {
        self.subject.base_name()
    }

    /// Parent style: base name of the nearest ancestor compound.
    pub fn parent_name(&self) -> Option<&str> {
        self.ancestors.last().and_then(Compound::base_name)
    }

    /// Tag of a bare element selector (`p`, not `p.note`).
    pub fn element_tag(&self) -> Option<&str> {
        match (&self.subject.tag, &self.subject.class) {
            (Some(tag), None) => Some(tag),
            _ => None,
        }
    }
}

/// A property with its component values.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// Lowercased property name.
    pub property: String,
    pub values: Vec<CssValue>,
    pub important: bool,
}

impl Declaration {
    pub fn new(property: impl Into<String>, values: Vec<CssValue>) -> Self {
        Self {
            property: property.into(),
            values,
            important: false,
        }
    }

    /// The single value of a one-component declaration.
    pub fn single(&self) -> Option<&CssValue> {
        match self.values.as_slice() {
            [value] => Some(value),
            _ => None,
        }
    }

    /// First identifier component, if any.
    pub fn first_ident(&self) -> Option<&str> {
        self.values.iter().find_map(CssValue::as_ident)
    }
}

/// One component value of a declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum CssValue {
    /// Numbers, dimensions and percentages; unitless numbers use `CssUnit::None`.
    Length(Length),
    /// Lowercased identifier.
    Ident(String),
    Str(String),
    /// Packed ARGB color from `#hex` or `rgb()`.
    Color(i64),
    Comma,
    Slash,
    /// Anything else (`url(...)`, unsupported functions).
    Other(String),
}

impl CssValue {
    pub fn as_ident(&self) -> Option<&str> {
        match self {
            CssValue::Ident(ident) => Some(ident),
            _ => None,
        }
    }

    pub fn as_length(&self) -> Option<Length> {
        match self {
            CssValue::Length(len) => Some(*len),
            _ => None,
        }
    }

    /// Color from a hash, `rgb()` or a named color keyword.
    pub fn as_color(&self) -> Option<i64> {
        match self {
            CssValue::Color(color) => Some(*color),
            CssValue::Ident(name) => named_color(name),
            _ => None,
        }
    }
}

impl Stylesheet {
    /// Parse stylesheet text. Lenient: bad rules are skipped.
    pub fn parse(css: &str) -> Self {
        let mut input = ParserInput::new(css);
        let mut parser = Parser::new(&mut input);
        let mut rules = Vec::new();

        let mut rule_parser = TopLevelRuleParser { rules: &mut rules };
        let stylesheet_parser = StyleSheetParser::new(&mut parser, &mut rule_parser);
        for result in stylesheet_parser {
            if let Err((_, slice)) = result {
                log::debug!("skipping unparsable css: {}", slice.trim());
            }
        }

        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Parse a declaration block body (`font-size: 2em; font-weight: bold`).
pub fn parse_declarations(text: &str) -> Vec<Declaration> {
    let mut input = ParserInput::new(text);
    let mut parser = Parser::new(&mut input);
    let mut declarations = Vec::new();
    let mut decl_parser = DeclarationListParser {
        declarations: &mut declarations,
    };
    for result in RuleBodyParser::new(&mut parser, &mut decl_parser) {
        let _ = result;
    }
    declarations
}

struct TopLevelRuleParser<'a> {
    rules: &'a mut Vec<CssRule>,
}

enum AtRulePrelude {
    Media,
    Ignored,
}

impl<'i> AtRuleParser<'i> for TopLevelRuleParser<'_> {
    type Prelude = AtRulePrelude;
    type AtRule = ();
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        while input.next().is_ok() {}
        if name.eq_ignore_ascii_case("media") {
            Ok(AtRulePrelude::Media)
        } else {
            log::warn!("unsupported at-rule @{name} skipped");
            Ok(AtRulePrelude::Ignored)
        }
    }

    fn rule_without_block(
        &mut self,
        _prelude: Self::Prelude,
        _start: &ParserState,
    ) -> Result<Self::AtRule, ()> {
        Ok(())
    }

    fn parse_block<'t>(
        &mut self,
        prelude: Self::Prelude,
        _start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::AtRule, ParseError<'i, Self::Error>> {
        if let AtRulePrelude::Media = prelude {
            log::debug!("@media block ignored");
        }
        while input.next().is_ok() {}
        Ok(())
    }
}

impl<'i> QualifiedRuleParser<'i> for TopLevelRuleParser<'_> {
    type Prelude = Vec<Selector>;
    type QualifiedRule = ();
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        let selectors = input.parse_comma_separated_ignoring_errors(parse_selector);
        if selectors.is_empty() {
            return Err(input.new_custom_error(()));
        }
        Ok(selectors)
    }

    fn parse_block<'t>(
        &mut self,
        prelude: Self::Prelude,
        _start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::QualifiedRule, ParseError<'i, Self::Error>> {
        let mut declarations = Vec::new();
        let mut decl_parser = DeclarationListParser {
            declarations: &mut declarations,
        };
        for result in RuleBodyParser::new(input, &mut decl_parser) {
            let _ = result;
        }

        self.rules.push(CssRule {
            selectors: prelude,
            declarations,
        });
        Ok(())
    }
}

/// Parse one selector of a selector list.
fn parse_selector<'i>(input: &mut Parser<'i, '_>) -> Result<Selector, ParseError<'i, ()>> {
    let start = input.position();
    let mut compounds = Vec::new();
    let mut current = Compound::default();

    loop {
        let token = match input.next_including_whitespace() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        match token {
            Token::WhiteSpace(_) | Token::Delim('>') => {
                if !current.is_empty() {
                    compounds.push(std::mem::take(&mut current));
                }
            }
            Token::Ident(name) if current.is_empty() => {
                current.tag = Some(name.to_ascii_lowercase());
            }
            Token::Delim('*') if current.is_empty() => {}
            Token::Delim('.') => match input.next_including_whitespace() {
                Ok(Token::Ident(class)) => current.class = Some(class.to_string()),
                _ => return Err(input.new_custom_error(())),
            },
            _ => {
                let text = input.slice_from(start);
                log::warn!("unsupported selector {:?} skipped", text.trim());
                while input.next().is_ok() {}
                return Err(input.new_custom_error(()));
            }
        }
    }
    if !current.is_empty() {
        compounds.push(current);
    }

    let subject = compounds.pop().ok_or_else(|| input.new_custom_error(()))?;
    Ok(Selector {
        ancestors: compounds,
        subject,
    })
}

struct DeclarationListParser<'a> {
    declarations: &'a mut Vec<Declaration>,
}

impl<'i> AtRuleParser<'i> for DeclarationListParser<'_> {
    type Prelude = ();
    type AtRule = ();
    type Error = ();
}

impl<'i> QualifiedRuleParser<'i> for DeclarationListParser<'_> {
    type Prelude = ();
    type QualifiedRule = ();
    type Error = ();
}

impl<'i> DeclarationParser<'i> for DeclarationListParser<'_> {
    type Declaration = ();
    type Error = ();

    fn parse_value<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
        _start: &ParserState,
    ) -> Result<Self::Declaration, ParseError<'i, Self::Error>> {
        let mut values = Vec::new();
        let mut important = false;
        loop {
            if input.try_parse(cssparser::parse_important).is_ok() {
                important = true;
                continue;
            }
            match parse_component(input) {
                Ok(Some(value)) => values.push(value),
                Ok(None) => {}
                Err(_) => break,
            }
        }
        if !values.is_empty() {
            self.declarations.push(Declaration {
                property: name.to_ascii_lowercase(),
                values,
                important,
            });
        }
        Ok(())
    }
}

impl<'i> RuleBodyItemParser<'i, (), ()> for DeclarationListParser<'_> {
    fn parse_declarations(&self) -> bool {
        true
    }
    fn parse_qualified(&self) -> bool {
        false
    }
}

/// Read the next component value. `Ok(None)` for tokens that carry nothing.
fn parse_component<'i>(input: &mut Parser<'i, '_>) -> Result<Option<CssValue>, ParseError<'i, ()>> {
    let token = input.next()?.clone();
    let value = match token {
        Token::Ident(ident) => CssValue::Ident(ident.to_ascii_lowercase()),
        Token::Number { value, .. } => CssValue::Length(Length::new(widen(value), CssUnit::None)),
        Token::Percentage {
            unit_value,
            int_value,
            ..
        } => {
            let percent = match int_value {
                Some(int) => f64::from(int),
                None => widen(unit_value * 100.0),
            };
            CssValue::Length(Length::percent(percent))
        }
        Token::Dimension { value, unit, .. } => match CssUnit::parse(&unit) {
            Some(unit) => CssValue::Length(Length::new(widen(value), unit)),
            None => CssValue::Other(format!("{value}{unit}")),
        },
        Token::Hash(hash) | Token::IDHash(hash) => match parse_hex_color(&hash) {
            Some(color) => CssValue::Color(color),
            None => CssValue::Other(format!("#{hash}")),
        },
        Token::QuotedString(text) => CssValue::Str(text.to_string()),
        Token::UnquotedUrl(url) => CssValue::Other(format!("url({url})")),
        Token::Comma => CssValue::Comma,
        Token::Delim('/') => CssValue::Slash,
        Token::Function(name) => {
            let name = name.to_ascii_lowercase();
            if name == "rgb" || name == "rgba" {
                let color = input.parse_nested_block(parse_rgb_arguments)?;
                CssValue::Color(color)
            } else {
                input.parse_nested_block(
                    |nested: &mut Parser<'i, '_>| -> Result<(), ParseError<'i, ()>> {
                        while nested.next().is_ok() {}
                        Ok(())
                    },
                )?;
                CssValue::Other(format!("{name}()"))
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// Tokenizer numbers are `f32`; keep their shortest decimal form.
fn widen(value: f32) -> f64 {
    value.to_string().parse().unwrap_or(f64::from(value))
}

fn parse_rgb_arguments<'i>(input: &mut Parser<'i, '_>) -> Result<i64, ParseError<'i, ()>> {
    let r = parse_color_component(input)?;
    let _ = input.try_parse(|i| i.expect_comma());
    let g = parse_color_component(input)?;
    let _ = input.try_parse(|i| i.expect_comma());
    let b = parse_color_component(input)?;
    // Alpha is not representable; skip it.
    while input.next().is_ok() {}
    Ok(pack_color(r, g, b))
}

fn parse_color_component<'i>(input: &mut Parser<'i, '_>) -> Result<u8, ParseError<'i, ()>> {
    let location = input.current_source_location();
    match input.next()? {
        Token::Number { value, .. } => Ok(value.round().clamp(0.0, 255.0) as u8),
        Token::Percentage { unit_value, .. } => {
            Ok((unit_value * 255.0).round().clamp(0.0, 255.0) as u8)
        }
        _ => Err(location.new_custom_error(())),
    }
}

fn parse_hex_color(hex: &str) -> Option<i64> {
    let digit = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 | 4 => Some(pack_color(
            digit(&hex[0..1])? * 17,
            digit(&hex[1..2])? * 17,
            digit(&hex[2..3])? * 17,
        )),
        6 | 8 => Some(pack_color(
            digit(&hex[0..2])?,
            digit(&hex[2..4])?,
            digit(&hex[4..6])?,
        )),
        _ => None,
    }
}

/// CSS named colors commonly found in e-book stylesheets.
pub fn named_color(name: &str) -> Option<i64> {
    let (r, g, b) = match name {
        "black" => (0, 0, 0),
        "white" => (255, 255, 255),
        "red" => (255, 0, 0),
        "green" => (0, 128, 0),
        "lime" => (0, 255, 0),
        "blue" => (0, 0, 255),
        "navy" => (0, 0, 128),
        "yellow" => (255, 255, 0),
        "cyan" | "aqua" => (0, 255, 255),
        "magenta" | "fuchsia" => (255, 0, 255),
        "gray" | "grey" => (128, 128, 128),
        "silver" => (192, 192, 192),
        "maroon" => (128, 0, 0),
        "olive" => (128, 128, 0),
        "purple" => (128, 0, 128),
        "teal" => (0, 128, 128),
        "orange" => (255, 165, 0),
        _ => return None,
    };
    Some(pack_color(r, g, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_rules() {
        let sheet = Stylesheet::parse("p { margin-top: 0.67em; text-indent: 1em }");
        assert_eq!(sheet.rules.len(), 1);
        let rule = &sheet.rules[0];
        assert_eq!(rule.selectors[0].style_name(), Some("p"));
        assert_eq!(rule.selectors[0].element_tag(), Some("p"));
        assert_eq!(rule.declarations.len(), 2);
        assert_eq!(
            rule.declarations[0].values,
            vec![CssValue::Length(Length::em(0.67))]
        );
    }

    #[test]
    fn test_selector_forms() {
        let sheet = Stylesheet::parse("p.note, .epigraph p, h1 { color: red }");
        let selectors = &sheet.rules[0].selectors;
        assert_eq!(selectors.len(), 3);
        assert_eq!(selectors[0].style_name(), Some("note"));
        assert_eq!(selectors[0].element_tag(), None);
        assert_eq!(selectors[1].style_name(), Some("p"));
        assert_eq!(selectors[1].parent_name(), Some("epigraph"));
        assert_eq!(selectors[2].style_name(), Some("h1"));
    }

    #[test]
    fn test_unsupported_selectors_skipped() {
        let sheet = Stylesheet::parse("a:hover, p { color: blue } [lang] { color: red }");
        assert_eq!(sheet.rules.len(), 1);
        assert_eq!(sheet.rules[0].selectors.len(), 1);
        assert_eq!(sheet.rules[0].selectors[0].style_name(), Some("p"));
    }

    #[test]
    fn test_media_and_at_rules_ignored() {
        let sheet = Stylesheet::parse(
            "@import url(x.css); @media print { p { color: red } } @font-face { src: url(a.ttf) } .x { color: #fff }",
        );
        assert_eq!(sheet.rules.len(), 1);
        assert_eq!(sheet.rules[0].selectors[0].style_name(), Some("x"));
    }

    #[test]
    fn test_important_stripped() {
        let decls = parse_declarations("font-weight: bold !important; color: #336699");
        assert_eq!(decls.len(), 2);
        assert!(decls[0].important);
        assert_eq!(decls[0].values, vec![CssValue::Ident("bold".into())]);
        assert_eq!(decls[1].values, vec![CssValue::Color(0xFF336699)]);
    }

    #[test]
    fn test_colors() {
        let decls = parse_declarations("color: rgb(255, 0, 0); background: #abc url(x.png) no-repeat");
        assert_eq!(decls[0].values, vec![CssValue::Color(0xFFFF0000)]);
        assert_eq!(decls[1].values[0], CssValue::Color(0xFFAABBCC));
        assert_eq!(named_color("grey"), Some(0xFF808080));
        assert_eq!(CssValue::Ident("navy".into()).as_color(), Some(0xFF000080));
    }

    #[test]
    fn test_shorthand_components() {
        let decls = parse_declarations("margin: 1em 0 2% auto");
        assert_eq!(
            decls[0].values,
            vec![
                CssValue::Length(Length::em(1.0)),
                CssValue::Length(Length::new(0.0, CssUnit::None)),
                CssValue::Length(Length::percent(2.0)),
                CssValue::Ident("auto".into()),
            ]
        );
    }
}
