use super::LineParser;
use crate::arch::{uop_from_letters, Architecture, UopCount};
use crate::error::PfResult;
use crate::mapping::Mapping;
use std::io::BufRead;

/// Parse a mapping file: one or more `mapping:` blocks. Instruction names
/// are interned into `arch`; uops must stay within its port range.
pub fn parse_mappings<R: BufRead>(input: R, arch: &mut Architecture) -> PfResult<Vec<Mapping>> {
    let mut parser = LineParser::new(input);
    parser.next_line_or_fail()?;
    let mut mappings = vec![parse_mapping(&mut parser, arch)?];
    while !parser.is_exhausted() {
        mappings.push(parse_mapping(&mut parser, arch)?);
    }
    Ok(mappings)
}

fn parse_mapping<R: BufRead>(
    parser: &mut LineParser<R>,
    arch: &mut Architecture,
) -> PfResult<Mapping> {
    parser.expect_line("mapping:")?;
    parser.next_line_or_fail()?;
    let mut mapping = Mapping::default();
    loop {
        parse_insn(parser, arch, &mut mapping)?;
        if parser.is_exhausted() || parser.is_line("mapping:") {
            break;
        }
    }
    Ok(mapping)
}

/// Parse one instruction header plus its uop lines; leaves the parser on
/// the next single-token line (or exhausted).
fn parse_insn<R: BufRead>(
    parser: &mut LineParser<R>,
    arch: &mut Architecture,
    mapping: &mut Mapping,
) -> PfResult<()> {
    parser.expect(parser.tokens().len() == 1, "Invalid instruction line!")?;
    let header = parser.tokens()[0].clone();
    parser.expect(
        header.ends_with(':'),
        "Missing terminating colon ':' in instruction line!",
    )?;
    let insn = arch.intern(&header[..header.len() - 1]);
    mapping.ensure_insn(insn);

    while parser.next_line()? {
        if parser.tokens().len() == 1 {
            break;
        }
        parser.expect(parser.tokens().len() == 2, "Invalid uop line!")?;
        let uop_token = parser.tokens()[0].clone();
        parser.expect(
            uop_token.ends_with(':'),
            "Missing colon ':' in uop line!",
        )?;
        let uop = uop_from_letters(&uop_token[..uop_token.len() - 1])
            .map_err(|msg| parser.error(msg))?;
        if uop & !arch.largest_uop() != 0 {
            return Err(parser.error("Mapping uses uop that is not in specified architecture!"));
        }
        let count: UopCount = parser.tokens()[1]
            .parse()
            .map_err(|_| parser.error("Invalid uop number!"))?;
        if !mapping.add_entry(insn, uop, count) {
            return Err(parser.error("Duplicate uop entry!"));
        }
    }
    Ok(())
}
