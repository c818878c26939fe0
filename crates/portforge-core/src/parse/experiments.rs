use super::LineParser;
use crate::arch::{Architecture, MAX_PORTS};
use crate::error::PfResult;
use crate::experiment::Experiment;
use std::io::BufRead;
use tracing::debug;

/// Parse an experiment file: the architecture header followed by any
/// number of experiment blocks. Instructions are interned into `arch` as
/// they appear.
pub fn parse_experiments<R: BufRead>(
    input: R,
    arch: &mut Architecture,
) -> PfResult<Vec<Experiment>> {
    let mut parser = LineParser::new(input);
    parser.next_line_or_fail()?;
    parse_architecture(&mut parser, arch)?;
    let mut exps = Vec::new();
    while parser.next_line()? {
        exps.push(parse_experiment(&mut parser, arch)?);
    }
    debug!(
        num_experiments = exps.len(),
        num_insns = arch.num_insns(),
        num_ports = arch.num_ports(),
        "parsed experiment file"
    );
    Ok(exps)
}

fn parse_architecture<R: BufRead>(
    parser: &mut LineParser<R>,
    arch: &mut Architecture,
) -> PfResult<()> {
    parser.expect_line("architecture:")?;
    parser.next_line_or_fail()?;
    parser.expect_line("instructions:")?;
    parser.next_line_or_fail()?;
    while parser.tokens()[0] != "ports:" {
        let name = parser.tokens()[0].clone();
        parser.expect(!name.ends_with(':'), "Invalid instruction line!")?;
        arch.intern(&name);
        parser.next_line_or_fail()?;
    }
    parser.expect(parser.tokens().len() == 2, "Invalid 'ports' line!")?;
    let ports: usize = parser.tokens()[1]
        .parse()
        .map_err(|_| parser.error("Invalid port number!"))?;
    if ports == 0 || ports > MAX_PORTS {
        return Err(parser.error("Port number out of range!"));
    }
    arch.set_num_ports(ports);
    Ok(())
}

fn parse_experiment<R: BufRead>(
    parser: &mut LineParser<R>,
    arch: &mut Architecture,
) -> PfResult<Experiment> {
    parser.expect_line("experiment:")?;
    parser.next_line_or_fail()?;
    parser.expect_line("instructions:")?;
    parser.next_line_or_fail()?;
    let mut seq = Vec::new();
    while parser.tokens()[0] != "cycles:" {
        let name = parser.tokens()[0].clone();
        parser.expect(!name.ends_with(':'), "Invalid instruction line!")?;
        seq.push(arch.intern(&name));
        parser.next_line_or_fail()?;
    }
    parser.expect(parser.tokens().len() == 2, "Invalid 'cycles' line!")?;
    let cycles: f64 = parser.tokens()[1]
        .parse()
        .map_err(|_| parser.error("Invalid cycle number!"))?;
    let mut exp = Experiment::new(seq);
    exp.set_measured_cycles(cycles);
    Ok(exp)
}
