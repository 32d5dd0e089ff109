// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use anyhow::{anyhow, bail, Result};
use injector::*;

use std::sync::Arc;

fn single_field(directives: &str, field_type: Type) -> Result<Engine> {
    let mut engine = Engine::default();
    engine.register_type(
        StructSchema::new("T").field(Field::new("F", field_type).tag("inject", directives)),
    )?;
    Ok(engine)
}

fn run(engine: &Engine, value: Option<Value>) -> Result<Value> {
    let mut record = Record::new("T");
    if let Some(v) = value {
        record.set("F", v);
    }
    let mut t = Value::from(record);
    engine.inject(&mut t)?;
    Ok(t["F"].clone())
}

#[test]
fn enum_membership() -> Result<()> {
    let engine = single_field("enum=agent,miner", Type::String)?;
    assert_eq!(run(&engine, Some(Value::from("miner")))?, Value::from("miner"));
    assert_eq!(run(&engine, None)?, Value::from("agent"));

    let err = run(&engine, Some(Value::from("pilot"))).unwrap_err();
    assert!(err.to_string().ends_with("[pilot] is not valid option"), "{err}");
    Ok(())
}

#[test]
fn enum_from_variable() -> Result<()> {
    let mut engine = single_field("enum=var@colors", Type::String)?;
    engine.add_var("colors", Value::from(vec![Value::from("red"), Value::from("blue")]))?;
    assert_eq!(run(&engine, None)?, Value::from("red"));
    assert_eq!(run(&engine, Some(Value::from("blue")))?, Value::from("blue"));

    let mut engine = single_field("enum=var@missing", Type::String)?;
    assert!(engine.prepare_type("T").is_err());
    engine.add_var("missing", Value::from(1i64))?;
    assert!(engine.prepare_type("T").is_err());
    Ok(())
}

#[test]
fn enum_placeholders() -> Result<()> {
    let engine = single_field("enum=a0x7Cb,c", Type::String)?;
    assert_eq!(run(&engine, None)?, Value::from("a|b"));
    Ok(())
}

#[test]
fn default_literals() -> Result<()> {
    let cases = [
        (Type::String, "hello", Value::from("hello")),
        (Type::Int, "-7", Value::from(-7i64)),
        (Type::Int, "0x10", Value::from(16i64)),
        (Type::UInt, "9", Value::from(9u64)),
        (Type::Float, "2.5", Value::from(2.5)),
        (Type::Bool, "true", Value::Bool(true)),
        (Type::optional(Type::String), "x", Value::from("x")),
    ];
    for (field_type, literal, expected) in cases {
        let engine = single_field(&format!("default={literal}"), field_type.clone())?;
        assert_eq!(run(&engine, None)?, expected, "{field_type} {literal}");
    }

    let engine = single_field("default=2024-01-02T03:04:05Z", Type::Timestamp)?;
    assert!(matches!(run(&engine, None)?, Value::Timestamp(_)));

    // Non-empty values are kept.
    let engine = single_field("default=5", Type::Int)?;
    assert_eq!(run(&engine, Some(Value::from(3i64)))?, Value::from(3i64));

    for literal in ["abc", "--5", "-+5"] {
        let engine = single_field(&format!("default={literal}"), Type::Int)?;
        assert!(
            matches!(engine.prepare_type("T"), Err(SetupError::Directive { .. })),
            "{literal}"
        );
    }
    Ok(())
}

#[test]
fn default_from_function_and_variable() -> Result<()> {
    let mut engine = single_field("default=fn@next", Type::Int)?;
    let counter = Arc::new(std::sync::atomic::AtomicI64::new(100));
    let c = counter.clone();
    engine.add_func("next", move || {
        Value::from(c.fetch_add(1, std::sync::atomic::Ordering::SeqCst))
    })?;
    assert_eq!(run(&engine, None)?, Value::from(100i64));
    assert_eq!(run(&engine, None)?, Value::from(101i64));

    let mut engine = single_field("default=var@greeting", Type::String)?;
    engine.add_var("greeting", Value::from("hi"))?;
    assert_eq!(run(&engine, None)?, Value::from("hi"));

    let mut engine = single_field("default=fn@wrong", Type::Int)?;
    engine.add_func("wrong", || Value::from("text"))?;
    assert!(run(&engine, None).is_err());
    Ok(())
}

#[test]
fn custom_directive() -> Result<()> {
    let mut engine = single_field("trim;upper=!", Type::String)?;
    engine.register_directive("trim", |_init: &DirectiveInit| -> Result<Handler> {
        Ok(Arc::new(|state: &HandlerState| -> Result<Value> {
            Ok(Value::from(state.field.as_string()?.trim()))
        }))
    })?;
    engine.register_directive("upper", |init: &DirectiveInit| -> Result<Handler> {
        if *init.field_type != Type::String {
            bail!("upper needs a string");
        }
        let suffix = init.param.to_string();
        Ok(Arc::new(move |state: &HandlerState| -> Result<Value> {
            Ok(Value::from(format!(
                "{}{suffix}",
                state.field.as_string()?.to_uppercase()
            )))
        }))
    })?;

    assert_eq!(run(&engine, Some(Value::from("  quiet ")))?, Value::from("QUIET!"));
    Ok(())
}

#[test]
fn handler_result_must_fit() -> Result<()> {
    let mut engine = single_field("count", Type::String)?;
    engine.register_directive("count", |_init: &DirectiveInit| -> Result<Handler> {
        Ok(Arc::new(|_state: &HandlerState| -> Result<Value> {
            Ok(Value::from(1i64))
        }))
    })?;
    let err = run(&engine, None).unwrap_err();
    assert!(err.to_string().contains("returned a number"), "{err}");
    Ok(())
}

#[test]
fn handlers_see_context() -> Result<()> {
    let mut engine = single_field("tenant", Type::String)?;
    engine.register_directive("tenant", |_init: &DirectiveInit| -> Result<Handler> {
        Ok(Arc::new(|state: &HandlerState| -> Result<Value> {
            state
                .get("tenant")
                .cloned()
                .ok_or_else(|| anyhow!("no tenant in context"))
        }))
    })?;

    let ctx = Value::from_json_str(r#"{ "tenant": "acme" }"#)?;
    let mut t = Value::from(Record::new("T"));
    engine.inject_with_ctx(&mut t, &ctx)?;
    assert_eq!(t["F"], Value::from("acme"));

    assert!(run(&engine, None).is_err());
    Ok(())
}

#[test]
fn overriding_builtins() -> Result<()> {
    let mut engine = single_field("enum=a", Type::String)?;
    engine.register_directive("enum", |_init: &DirectiveInit| -> Result<Handler> {
        Ok(Arc::new(|_state: &HandlerState| -> Result<Value> {
            Ok(Value::from("overridden"))
        }))
    })?;
    assert_eq!(run(&engine, None)?, Value::from("overridden"));

    // Built-ins are copied per engine.
    let other = single_field("enum=a", Type::String)?;
    assert_eq!(run(&other, None)?, Value::from("a"));
    Ok(())
}

#[test]
fn registration_rules() -> Result<()> {
    let mut engine = Engine::default();
    let noop = |_init: &DirectiveInit| -> Result<Handler> {
        Ok(Arc::new(|state: &HandlerState| -> Result<Value> {
            Ok(state.field.clone())
        }))
    };

    for name in ["dive", "omitempty", "-", "a|b", "a=b", "a;b", "", "  "] {
        assert!(engine.register_directive(name, noop).is_err(), "{name:?}");
        assert!(engine.register_alias(name, "enum=a").is_err(), "{name:?}");
    }

    engine.register_alias("color", "enum=red")?;
    assert!(matches!(
        engine.register_directive("color", noop),
        Err(RegistryError::Collision { .. })
    ));
    assert!(matches!(
        engine.register_alias("by", "enum=x"),
        Err(RegistryError::Collision { .. })
    ));
    Ok(())
}

#[test]
fn segment_separator_is_restricted() {
    let mut engine = Engine::default();
    for name in ["a;b", ";", "trim;"] {
        assert!(
            matches!(
                engine.register_alias(name, "enum=a"),
                Err(RegistryError::Restricted { .. })
            ),
            "{name:?}"
        );
    }
}

#[test]
fn alias_errors_report_alias() -> Result<()> {
    let mut engine = single_field("color", Type::String)?;
    engine.register_alias("color", "enum=red,green")?;
    let mut t = Value::from(Record::new("T").with("F", "blue"));
    let err = engine.inject(&mut t).unwrap_err();
    let field = err.field_error().ok_or_else(|| anyhow!("{err}"))?;
    assert_eq!(field.tag, "color");
    assert_eq!(field.actual_tag, "enum");
    Ok(())
}
