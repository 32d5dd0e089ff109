// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use std::collections::BTreeMap;
use std::env;
use std::path::Path;

use anyhow::{bail, Result};
use injector::*;
use serde::Deserialize;
use test_generator::test_resources;
use walkdir::WalkDir;

#[derive(Deserialize, Debug)]
struct TestCase {
    note: String,
    config: Option<Config>,
    schemas: Vec<StructSchema>,
    #[serde(default)]
    aliases: BTreeMap<String, String>,
    #[serde(default)]
    vars: BTreeMap<String, Value>,
    #[serde(rename = "type")]
    type_name: String,
    input: Option<Value>,
    ctx: Option<Value>,
    partial: Option<Vec<String>>,
    except: Option<Vec<String>>,
    want_result: Option<Value>,
    error: Option<String>,
    skip: Option<bool>,
}

#[derive(Deserialize, Debug)]
struct YamlTest {
    cases: Vec<TestCase>,
}

// Fields missing from the computed record read as their zero value. Fields
// missing from the expected record are not checked.
fn match_values(engine: &Engine, computed: &Value, expected: &Value, path: &str) -> Result<()> {
    match (computed, expected) {
        (Value::Struct(c), Value::Struct(e)) if c.type_name() == e.type_name() => {
            let schema = engine.schema(c.type_name());
            for (name, want) in e.fields() {
                let zero = schema
                    .and_then(|s| s.get(name))
                    .map(|f| f.field_type.zero_value())
                    .unwrap_or(Value::Null);
                let got = c.get(name).unwrap_or(&zero);
                match_values(engine, got, want, &format!("{path}.{name}"))?;
            }
            Ok(())
        }
        (Value::Array(c), Value::Array(e)) => {
            if c.len() != e.len() {
                bail!("{path}: array length mismatch: {} != {}", c.len(), e.len());
            }
            for (idx, (got, want)) in c.iter().zip(e.iter()).enumerate() {
                match_values(engine, got, want, &format!("{path}[{idx}]"))?;
            }
            Ok(())
        }
        (Value::Map(c), Value::Map(e)) => {
            if c.len() != e.len() {
                bail!("{path}: map length mismatch: {} != {}", c.len(), e.len());
            }
            for (key, want) in e.iter() {
                let Some(got) = c.get(key) else {
                    bail!("{path}: missing key {key}");
                };
                match_values(engine, got, want, &format!("{path}[{}]", key.key_text()))?;
            }
            Ok(())
        }
        (c, e) if c == e => Ok(()),
        (c, e) => bail!("{path}: value mismatch\nleft  = {c}\nright = {e}"),
    }
}

fn run_case(engine: &mut Engine, case: &TestCase) -> Result<Value> {
    for schema in &case.schemas {
        engine.register_type(schema.clone())?;
    }
    for (alias, directives) in &case.aliases {
        engine.register_alias(alias, directives)?;
    }
    for (name, value) in &case.vars {
        engine.add_var(name, value.clone())?;
    }

    let input = case.input.clone().unwrap_or_else(Value::new_map);
    let mut target = engine.record_from_value(&case.type_name, input)?;
    let ctx = case.ctx.clone().unwrap_or(Value::Null);

    match (&case.partial, &case.except) {
        (Some(fields), _) => {
            let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
            engine.inject_partial_with_ctx(&mut target, &fields, &ctx)?;
        }
        (None, Some(fields)) => {
            let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
            engine.inject_except_with_ctx(&mut target, &fields, &ctx)?;
        }
        (None, None) => engine.inject_with_ctx(&mut target, &ctx)?,
    }
    Ok(target)
}

fn yaml_test_impl(file: &str) -> Result<()> {
    let yaml_str = std::fs::read_to_string(file)?;
    let test: YamlTest = serde_yaml::from_str(&yaml_str)?;

    println!("running {file}");

    for case in test.cases {
        print!("case {} ", case.note);
        if case.skip == Some(true) {
            println!("skipped");
            continue;
        }

        match (&case.want_result, &case.error) {
            (Some(_), None) | (None, Some(_)) => (),
            _ => bail!("{}: either want_result or error must be specified", case.note),
        }

        let mut engine = Engine::new(case.config.clone().unwrap_or_default());
        match run_case(&mut engine, &case) {
            Ok(computed) => match &case.want_result {
                Some(want) => {
                    let expected = engine.record_from_value(&case.type_name, want.clone())?;
                    match_values(&engine, &computed, &expected, &case.type_name)?;
                }
                None => bail!("{}: injection succeeded, expected an error", case.note),
            },
            Err(actual) => match &case.error {
                Some(expected) => {
                    let actual = actual.to_string();
                    if !actual.contains(expected) {
                        bail!("Error message\n`{actual}`\ndoes not contain `{expected}`");
                    }
                }
                None => return Err(actual),
            },
        }

        println!("passed");
    }

    Ok(())
}

fn yaml_test(file: &str) -> Result<()> {
    match yaml_test_impl(file) {
        Ok(_) => Ok(()),
        Err(e) => {
            // cargo test does not always print a returned error.
            panic!("{}", e);
        }
    }
}

#[test_resources("tests/cases/**/*.yaml")]
fn run(path: &str) {
    yaml_test(path).unwrap()
}

#[test]
#[ignore = "intended for running case files from other directories"]
fn run_dirs() -> Result<()> {
    let mut failures = vec![];
    for a in env::args() {
        if !Path::new(&a).is_dir() {
            continue;
        }
        for entry in WalkDir::new(a)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path().to_string_lossy().to_string();
            if !entry.path().is_file() || !path.ends_with(".yaml") {
                continue;
            }
            if let Err(e) = yaml_test_impl(&path) {
                failures.push((path, e));
            }
        }
    }

    if !failures.is_empty() {
        dbg!(failures);
        panic!("failed");
    }
    Ok(())
}
