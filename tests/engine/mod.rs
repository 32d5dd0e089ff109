// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use anyhow::{anyhow, bail, Result};
use injector::*;

use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
struct User {
    name: String,
    role: String,
}

impl Typed for User {
    fn value_type() -> Type {
        Type::record("User")
    }

    fn from_value(value: &Value) -> Result<Self> {
        let r = value.as_record()?;
        Ok(Self {
            name: r.get("Name").map(String::from_value).transpose()?.unwrap_or_default(),
            role: r.get("Role").map(String::from_value).transpose()?.unwrap_or_default(),
        })
    }

    fn into_value(self) -> Value {
        Value::from(
            Record::new("User")
                .with("Name", self.name)
                .with("Role", self.role),
        )
    }
}

fn user_by_name(name: String) -> Result<User> {
    if name.is_empty() || name == "banned" {
        bail!("no user named `{name}`");
    }
    Ok(User {
        name,
        role: "miner".to_string(),
    })
}

fn register_types(engine: &mut Engine) -> Result<()> {
    engine.register_type(
        StructSchema::new("User")
            .field(Field::new("Name", Type::String))
            .field(Field::new("Role", Type::String).tag("inject", "enum=agent,miner")),
    )?;
    engine.register_type(
        StructSchema::new("Login")
            .field(Field::new("Username1", Type::String))
            .field(Field::new("Username2", Type::String))
            .field(Field::new("Role", Type::String).tag("inject", "enum=agent,miner"))
            .field(
                Field::new("User", Type::optional(Type::record("User")))
                    .tag("inject", "by=Username1|by=Username2"),
            ),
    )?;
    engine.register_type(StructSchema::new("Creds").field(Field::new("Username", Type::String)))?;
    engine.register_type(
        StructSchema::new("Session")
            .field(Field::new("C", Type::record("Creds")))
            .field(
                Field::new("User", Type::optional(Type::record("User"))).tag("inject", "by=C.Username"),
            ),
    )?;
    engine.register_type(
        StructSchema::new("Sum")
            .field(Field::new("A", Type::Int))
            .field(Field::new("B", Type::Int).tag("inject", "by=A")),
    )?;
    Ok(())
}

fn engine() -> Result<Engine> {
    let mut engine = Engine::default();
    register_types(&mut engine)?;
    engine.add_resolver(user_by_name)?;
    engine.add_resolver(|ctx: ResolveContext, a: i64| -> Result<i64> {
        let base = ctx
            .get("base")
            .ok_or_else(|| anyhow!("missing base"))?
            .as_i64()?;
        Ok(base + a)
    })?;
    Ok(engine)
}

#[test]
fn or_group_first_success() -> Result<()> {
    let engine = engine()?;
    let mut login = Value::from(
        Record::new("Login")
            .with("Username1", "peter")
            .with("Username2", "")
            .with("Role", "miner"),
    );
    engine.inject(&mut login)?;

    let user = User::from_value(&login["User"])?;
    assert_eq!(user.name, "peter");
    assert_eq!(user.role, "miner");
    Ok(())
}

#[test]
fn or_group_second_alternative() -> Result<()> {
    let engine = engine()?;
    let mut login = Value::from(
        Record::new("Login")
            .with("Username1", "banned")
            .with("Username2", "paul")
            .with("Role", "agent"),
    );
    engine.inject(&mut login)?;
    assert_eq!(login["User"]["Name"], Value::from("paul"));
    Ok(())
}

#[test]
fn or_group_all_fail() -> Result<()> {
    let engine = engine()?;
    let mut login = Value::from(
        Record::new("Login")
            .with("Username1", "")
            .with("Username2", "banned")
            .with("Role", "miner"),
    );
    let err = engine.inject(&mut login).unwrap_err();
    let field = err.field_error().ok_or_else(|| anyhow!("{err}"))?;
    assert_eq!(field.namespace, "Login.User");
    assert_eq!(field.tag, "by|by");
    assert!(field.cause.to_string().contains("banned"), "{}", field.cause);
    assert!(!field.is_fault());
    Ok(())
}

#[test]
fn nested_sibling_path() -> Result<()> {
    let engine = engine()?;
    let mut session = Value::from(
        Record::new("Session").with("C", Record::new("Creds").with("Username", "peter")),
    );
    engine.inject(&mut session)?;
    assert_eq!(session["User"]["Name"], Value::from("peter"));
    Ok(())
}

#[test]
fn context_resolver() -> Result<()> {
    let engine = engine()?;
    let mut sum = Value::from(Record::new("Sum").with("A", 1i64));
    let mut bag = BTreeMap::new();
    bag.insert(Value::from("base"), Value::from(10i64));

    engine.inject_with_ctx(&mut sum, &Value::from(bag))?;
    assert_eq!(sum["B"], Value::from(11i64));

    // Without a bag the resolver reports its own error.
    let mut sum = Value::from(Record::new("Sum").with("A", 1i64));
    let err = engine.inject(&mut sum).unwrap_err();
    assert!(err.to_string().contains("missing base"), "{err}");
    Ok(())
}

#[test]
fn untagged_fields_unchanged() -> Result<()> {
    let mut engine = Engine::default();
    engine.register_type(
        StructSchema::new("Plain")
            .field(Field::new("A", Type::String))
            .field(Field::new("B", Type::array(Type::Int))),
    )?;
    let original = Value::from(
        Record::new("Plain")
            .with("A", "x")
            .with("B", vec![Value::from(1i64)]),
    );
    let mut plain = original.clone();
    engine.inject(&mut plain)?;
    assert_eq!(plain, original);
    Ok(())
}

#[test]
fn nested_structs_are_processed() -> Result<()> {
    let engine = engine()?;
    let mut user = Value::from(Record::new("User").with("Name", "n"));
    engine.inject(&mut user)?;
    assert_eq!(user["Role"], Value::from("agent"));

    let mut session = Value::from(
        Record::new("Session")
            .with("C", Record::new("Creds").with("Username", "peter"))
            .with("User", Record::new("User").with("Role", "pilot")),
    );
    // The nested user is validated before the field itself is resolved.
    let err = engine.inject(&mut session).unwrap_err();
    let field = err.field_error().ok_or_else(|| anyhow!("{err}"))?;
    assert_eq!(field.namespace, "Session.User.Role");
    assert_eq!(field.cause.to_string(), "[pilot] is not valid option");
    Ok(())
}

#[test]
fn invalid_target() -> Result<()> {
    let engine = engine()?;
    let mut v = Value::from(1i64);
    assert!(matches!(
        engine.inject(&mut v),
        Err(InjectError::InvalidTarget(_))
    ));
    Ok(())
}

#[test]
fn unknown_type() -> Result<()> {
    let engine = engine()?;
    let mut v = Value::from(Record::new("Ghost"));
    assert!(matches!(
        engine.inject(&mut v),
        Err(InjectError::Setup(SetupError::UnknownType(_)))
    ));
    Ok(())
}

#[test]
fn error_namespaces_use_display_names() -> Result<()> {
    let mut engine = Engine::new(Config {
        field_name_tag: Some("json".to_string()),
        ..Config::default()
    });
    engine.register_type(
        StructSchema::new("Leaf").field(
            Field::new("Kind", Type::String)
                .tag("inject", "enum=a,b")
                .tag("json", "kind"),
        ),
    )?;
    engine.register_type(
        StructSchema::new("Tree").field(
            Field::new("Leaves", Type::array(Type::record("Leaf")))
                .tag("inject", "dive")
                .tag("json", "leaves"),
        ),
    )?;

    let mut tree = Value::from(Record::new("Tree").with(
        "Leaves",
        vec![
            Value::from(Record::new("Leaf").with("Kind", "a")),
            Value::from(Record::new("Leaf").with("Kind", "z")),
        ],
    ));
    let err = engine.inject(&mut tree).unwrap_err();
    let field = err.field_error().ok_or_else(|| anyhow!("{err}"))?;
    assert_eq!(field.namespace, "Tree.Leaves[1].Kind");
    assert_eq!(field.name_namespace, "Tree.leaves[1].kind");
    assert_eq!(field.field, "Kind");
    assert_eq!(field.name, "kind");
    assert_eq!(field.tag, "enum");
    assert_eq!(field.param, "a,b");
    assert_eq!(field.value, Value::from("z"));
    assert_eq!(
        err.to_string(),
        "Key: 'Tree.Leaves[1].Kind' Error:Field injection for 'Kind' failed on the 'enum' tag: [z] is not valid option"
    );
    Ok(())
}

#[test]
fn dive_over_maps() -> Result<()> {
    let mut engine = Engine::default();
    engine.register_type(
        StructSchema::new("Palette").field(
            Field::new("Mp", Type::map(Type::String, Type::String)).tag("inject", "dive;enum=red,green"),
        ),
    )?;

    let mut colors = BTreeMap::new();
    colors.insert(Value::from("a"), Value::from("red"));
    colors.insert(Value::from("b"), Value::from(""));
    let mut palette = Value::from(Record::new("Palette").with("Mp", colors.clone()));
    engine.inject(&mut palette)?;
    assert_eq!(palette["Mp"]["b"], Value::from("red"));

    colors.insert(Value::from("c"), Value::from("blue"));
    let mut palette = Value::from(Record::new("Palette").with("Mp", colors));
    let err = engine.inject(&mut palette).unwrap_err();
    let field = err.field_error().ok_or_else(|| anyhow!("{err}"))?;
    assert_eq!(field.namespace, "Palette.Mp[c]");
    Ok(())
}

#[test]
fn dive_over_null_and_scalars() -> Result<()> {
    let mut engine = Engine::default();
    engine.register_type(
        StructSchema::new("Bag")
            .field(Field::new("Items", Type::optional(Type::array(Type::String))).tag("inject", "dive;enum=x"))
            .field(Field::new("Any", Type::Any).tag("inject", "dive")),
    )?;

    let mut bag = Value::from(Record::new("Bag"));
    engine.inject(&mut bag)?;

    let mut bag = Value::from(Record::new("Bag").with("Any", 3i64));
    let err = engine.inject(&mut bag).unwrap_err();
    let field = err.field_error().ok_or_else(|| anyhow!("{err}"))?;
    assert_eq!(field.tag, "dive");
    assert_eq!(field.namespace, "Bag.Any");
    Ok(())
}

#[test]
fn omitempty() -> Result<()> {
    let mut engine = Engine::default();
    engine.register_type(
        StructSchema::new("Opt")
            .field(Field::new("S", Type::String).tag("inject", "omitempty;enum=a"))
            .field(Field::new("P", Type::optional(Type::String)).tag("inject", "omitempty;enum=a")),
    )?;

    // Empty values stop the chain, so enum does not fill them in.
    let mut opt = Value::from(Record::new("Opt"));
    engine.inject(&mut opt)?;
    assert_eq!(opt["S"], Value::Null);
    assert!(opt["P"].is_null());

    // A present optional holding an empty string is not omitted.
    let mut opt = Value::from(Record::new("Opt").with("P", ""));
    engine.inject(&mut opt)?;
    assert_eq!(opt["P"], Value::from("a"));
    Ok(())
}

#[test]
fn struct_hooks() -> Result<()> {
    let mut engine = Engine::default();
    engine.register_type(
        StructSchema::new("Order")
            .field(Field::new("Qty", Type::Int).tag("inject", "default=1"))
            .field(Field::new("Total", Type::Int)),
    )?;
    engine.register_type(
        StructSchema::new("Cart").field(Field::new("Orders", Type::array(Type::record("Order"))).tag("inject", "dive")),
    )?;
    engine.register_struct_hook(
        |sl: &mut StructLevel| {
            let qty = sl.current.get("Qty").map(|v| v.as_i64()).transpose()?.unwrap_or(0);
            if qty > 100 {
                bail!("too many at {}", sl.namespace);
            }
            sl.current.set("Total", Value::from(qty * 5));
            Ok(())
        },
        &["Order"],
    )?;

    let mut cart = Value::from(Record::new("Cart").with(
        "Orders",
        vec![
            Value::from(Record::new("Order")),
            Value::from(Record::new("Order").with("Qty", 3i64)),
        ],
    ));
    engine.inject(&mut cart)?;
    assert_eq!(cart["Orders"][0]["Total"], Value::from(5i64));
    assert_eq!(cart["Orders"][1]["Total"], Value::from(15i64));

    let mut cart = Value::from(Record::new("Cart").with(
        "Orders",
        vec![Value::from(Record::new("Order").with("Qty", 500i64))],
    ));
    let err = engine.inject(&mut cart).unwrap_err();
    let field = err.field_error().ok_or_else(|| anyhow!("{err}"))?;
    assert_eq!(field.namespace, "Cart.Orders[0]");
    assert_eq!(field.tag, "structlevel");
    assert!(field.cause.to_string().contains("Cart.Orders[0]."));
    Ok(())
}

#[test]
fn structonly_and_nostructlevel() -> Result<()> {
    let mut engine = Engine::default();
    engine.register_type(
        StructSchema::new("Inner").field(Field::new("Kind", Type::String).tag("inject", "enum=k")),
    )?;
    engine.register_type(
        StructSchema::new("Outer")
            .field(Field::new("Hooked", Type::record("Inner")).tag("inject", "structonly"))
            .field(Field::new("Skipped", Type::record("Inner")).tag("inject", "nostructlevel"))
            .field(Field::new("Full", Type::record("Inner"))),
    )?;
    engine.register_struct_hook(
        |sl: &mut StructLevel| {
            sl.current.set("Seen", Value::Bool(true));
            Ok(())
        },
        &["Inner"],
    )?;

    let mut outer = Value::from(Record::new("Outer"));
    engine.inject(&mut outer)?;

    assert_eq!(outer["Hooked"]["Seen"], Value::Bool(true));
    assert!(outer["Hooked"]["Kind"].is_null());
    assert!(outer["Skipped"].is_null());
    assert_eq!(outer["Full"]["Kind"], Value::from("k"));
    assert_eq!(outer["Full"]["Seen"], Value::Bool(true));
    Ok(())
}

#[test]
fn hook_sees_the_root() -> Result<()> {
    let mut engine = Engine::default();
    engine.register_type(StructSchema::new("Child").field(Field::new("Copy", Type::String)))?;
    engine.register_type(
        StructSchema::new("Parent")
            .field(Field::new("Label", Type::String))
            .field(Field::new("Kid", Type::record("Child"))),
    )?;
    engine.register_struct_hook(
        |sl: &mut StructLevel| {
            let label = sl.top["Label"].clone();
            sl.current.set("Copy", label);
            Ok(())
        },
        &["Child"],
    )?;

    let mut parent = Value::from(Record::new("Parent").with("Label", "root label"));
    engine.inject(&mut parent)?;
    assert_eq!(parent["Kid"]["Copy"], Value::from("root label"));
    Ok(())
}

#[test]
fn hook_sees_injected_root_fields() -> Result<()> {
    let mut engine = Engine::default();
    engine.register_type(StructSchema::new("Child").field(Field::new("Copy", Type::String)))?;
    engine.register_type(
        StructSchema::new("Parent")
            .field(Field::new("Label", Type::String).tag("inject", "enum=a,b"))
            .field(Field::new("Kid", Type::record("Child"))),
    )?;
    engine.register_struct_hook(
        |sl: &mut StructLevel| {
            let label = sl.top["Label"].clone();
            sl.current.set("Copy", label);
            Ok(())
        },
        &["Child"],
    )?;

    let mut parent = Value::from(Record::new("Parent"));
    engine.inject(&mut parent)?;
    assert_eq!(parent["Label"], Value::from("a"));
    assert_eq!(parent["Kid"]["Copy"], Value::from("a"));
    Ok(())
}

#[test]
fn hook_sees_earlier_elements() -> Result<()> {
    let mut engine = Engine::default();
    engine.register_type(
        StructSchema::new("Line")
            .field(Field::new("Sku", Type::String).tag("inject", "default=sku"))
            .field(Field::new("Before", Type::Int))
            .field(Field::new("Order", Type::String)),
    )?;
    engine.register_type(
        StructSchema::new("Order")
            .field(Field::new("Id", Type::String).tag("inject", "default=o-1"))
            .field(Field::new("Lines", Type::array(Type::record("Line"))).tag("inject", "dive")),
    )?;
    engine.register_struct_hook(
        |sl: &mut StructLevel| {
            let Value::Array(lines) = &sl.top["Lines"] else {
                bail!("lines missing from {}", sl.top);
            };
            if !lines.iter().any(|l| l["Sku"] == Value::from("sku")) {
                bail!("current line not visible in the root");
            }
            let before = lines.iter().filter(|l| !l["Before"].is_null()).count();
            let id = sl.top["Id"].clone();
            sl.current.set("Before", Value::from(before as i64));
            sl.current.set("Order", id);
            Ok(())
        },
        &["Line"],
    )?;

    let lines = vec![Value::from(Record::new("Line")), Value::from(Record::new("Line"))];
    let mut order = Value::from(Record::new("Order").with("Lines", lines));
    engine.inject(&mut order)?;

    assert_eq!(order["Lines"][0]["Before"], Value::from(0i64));
    assert_eq!(order["Lines"][1]["Before"], Value::from(1i64));
    assert_eq!(order["Lines"][1]["Order"], Value::from("o-1"));
    assert_eq!(order["Lines"][1]["Sku"], Value::from("sku"));
    Ok(())
}

#[test]
fn nested_values_are_updated_in_place() -> Result<()> {
    let mut engine = Engine::default();
    engine.register_type(
        StructSchema::new("Child")
            .field(Field::new("Copy", Type::String).tag("inject", "default=x")),
    )?;
    engine.register_type(
        StructSchema::new("Parent")
            .field(Field::new("Kid", Type::record("Child")))
            .field(Field::new("Kids", Type::array(Type::record("Child"))).tag("inject", "dive")),
    )?;

    let kids = vec![Value::from(Record::new("Child"))];
    let mut parent = Value::from(
        Record::new("Parent")
            .with("Kid", Record::new("Child"))
            .with("Kids", kids),
    );
    let (kid, kids) = match (&parent["Kid"], &parent["Kids"]) {
        (Value::Struct(kid), Value::Array(kids)) => (Arc::as_ptr(kid), Arc::as_ptr(kids)),
        _ => bail!("unexpected shape {parent}"),
    };

    engine.inject(&mut parent)?;

    assert_eq!(parent["Kid"]["Copy"], Value::from("x"));
    assert_eq!(parent["Kids"][0]["Copy"], Value::from("x"));
    match (&parent["Kid"], &parent["Kids"]) {
        (Value::Struct(k), Value::Array(ks)) => {
            assert!(std::ptr::eq(Arc::as_ptr(k), kid));
            assert!(std::ptr::eq(Arc::as_ptr(ks), kids));
        }
        _ => bail!("unexpected shape {parent}"),
    }
    Ok(())
}

#[test]
fn depth_guard() -> Result<()> {
    let mut engine = Engine::new(Config {
        max_depth: 3,
        ..Config::default()
    });
    engine.register_type(
        StructSchema::new("Node")
            .field(Field::new("Next", Type::optional(Type::record("Node"))))
            .field(Field::new("Id", Type::Int)),
    )?;

    let mut node = Value::from(Record::new("Node"));
    for _ in 0..5 {
        node = Value::from(Record::new("Node").with("Next", node));
    }
    let err = engine.inject(&mut node).unwrap_err();
    let field = err.field_error().ok_or_else(|| anyhow!("{err}"))?;
    assert!(field.cause.to_string().contains("maximum nesting depth"));
    Ok(())
}

#[test]
fn processed_fields_stay_mutated() -> Result<()> {
    let mut engine = Engine::default();
    engine.register_type(
        StructSchema::new("Pair")
            .field(Field::new("First", Type::String).tag("inject", "enum=x,y"))
            .field(Field::new("Second", Type::String).tag("inject", "enum=x,y")),
    )?;
    let mut pair = Value::from(Record::new("Pair").with("Second", "z"));
    assert!(engine.inject(&mut pair).is_err());
    assert_eq!(pair["First"], Value::from("x"));
    assert_eq!(pair["Second"], Value::from("z"));
    Ok(())
}

#[test]
fn config_from_json() -> Result<()> {
    let config = Config::from_json_str(r#"{ "tagName": "di", "fieldNameTag": "json" }"#)?;
    assert_eq!(config.tag_name, "di");
    assert_eq!(config.field_name_tag.as_deref(), Some("json"));
    assert_eq!(config.max_depth, 64);
    Ok(())
}

#[test]
fn schemas_from_json() -> Result<()> {
    let mut engine = Engine::default();
    engine.register_types_from_json(
        r#"[
          {
            "name": "Event",
            "fields": [
              { "name": "Kind", "type": { "type": "string" }, "tags": { "inject": "enum=open,close" } },
              { "name": "At", "type": { "type": "timestamp" } },
              { "name": "Counts", "type": { "type": "map", "key_type": { "type": "int" }, "value_type": { "type": "uInt" } } }
            ]
          }
        ]"#,
    )?;

    let mut event = engine.record_from_json(
        "Event",
        r#"{ "At": "2024-05-01T10:00:00Z", "Counts": { "1": 2 } }"#,
    )?;
    assert!(matches!(event["At"], Value::Timestamp(_)));
    assert_eq!(engine.get_field(&event, "Counts[1]").map(|(v, _)| v), Some(Value::from(2u64)));

    engine.inject(&mut event)?;
    assert_eq!(event["Kind"], Value::from("open"));

    assert!(engine.record_from_json("Event", r#"{ "Nope": 1 }"#).is_err());
    assert!(engine.record_from_json("Event", r#"{ "Kind": 1 }"#).is_err());
    Ok(())
}
