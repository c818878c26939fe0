use super::LineParser;
use crate::config::Config;
use crate::error::PfResult;
use std::io::BufRead;
use tracing::warn;

/// Parse a config file: a `configuration:` header followed by
/// `Key: Value` lines. Unknown keys are ignored with a warning.
pub fn parse_config<R: BufRead>(input: R) -> PfResult<Config> {
    let mut parser = LineParser::new(input);
    let mut config = Config::default();
    parser.next_line_or_fail()?;
    parser.expect_line("configuration:")?;
    while parser.next_line()? {
        parser.expect(parser.tokens().len() == 2, "Invalid config option!")?;
        let key_token = parser.tokens()[0].clone();
        parser.expect(key_token.ends_with(':'), "Missing colon in config option!")?;
        let key = &key_token[..key_token.len() - 1];
        let value = parser.tokens()[1].clone();
        let bad_value = || parser.error("Invalid value!");
        match key {
            "PopulationSize" => {
                config.population_size = value.parse().map_err(|_| bad_value())?;
            }
            "MaxRecombinationFactor" => {
                config.max_recombination_factor = value.parse().map_err(|_| bad_value())?;
            }
            "MaxMutationFactor" => {
                config.max_mutation_factor = value.parse().map_err(|_| bad_value())?;
            }
            "NumIterations" => {
                config.num_iterations = value.parse().map_err(|_| bad_value())?;
            }
            "NumEpochs" => {
                config.num_epochs = value.parse().map_err(|_| bad_value())?;
            }
            "KeepRatio" => {
                config.keep_ratio = value.parse().map_err(|_| bad_value())?;
            }
            "LuckChance" => {
                config.luck_chance = value.parse().map_err(|_| bad_value())?;
            }
            "BadLuckProtection" => {
                config.bad_luck_protection = value.parse().map_err(|_| bad_value())?;
            }
            "MutAddUopChance" => {
                config.mut_add_uop_chance = value.parse().map_err(|_| bad_value())?;
            }
            "MutChangeUopChance" => {
                config.mut_change_uop_chance = value.parse().map_err(|_| bad_value())?;
            }
            "MutChangeNumChance" => {
                config.mut_change_num_chance = value.parse().map_err(|_| bad_value())?;
            }
            "NumPorts" => {
                config.num_ports = value.parse().map_err(|_| bad_value())?;
            }
            "EnableLocalOptimization" => {
                config.enable_local_optimization = parse_bool(&value).ok_or_else(bad_value)?;
            }
            "EnableRatioCombination" => {
                config.enable_ratio_combination = parse_bool(&value).ok_or_else(bad_value)?;
            }
            other => {
                warn!(key = other, "ignoring unknown config key");
            }
        }
    }
    Ok(config)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "True" | "true" | "1" => Some(true),
        "False" | "false" | "0" => Some(false),
        _ => None,
    }
}
