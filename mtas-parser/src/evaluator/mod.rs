//! Value and condition evaluation
//!
//! Pure functions over parser objects and the open ancestor stacks. Nothing
//! here mutates parse state.

use crate::ledger::VariableTables;
use crate::object::{ObjectStacks, ObjectView, ParserObject};
use mtas_core::{
    apply_filters, Condition, ConditionKind, ConditionTarget, MappingRule, ValueItem,
    ValueKind, ValuePart, ValueSource, TOKEN_DELIMITER,
};

/// One value alternative: concatenated parts.
pub type Alternative = Vec<ValuePart>;

// ============================================================================
// VALUES
// ============================================================================

/// Open ancestors of a category, most recent first.
pub fn resolve_ancestors<'s, 'c>(
    stacks: &'s ObjectStacks<'c>,
    category: mtas_core::Category,
    distance: Option<usize>,
) -> Vec<&'s ParserObject<'c>> {
    stacks.ancestors(category, distance)
}

/// Alternatives an item yields when read from one object.
pub fn compute_value(
    object: &dyn ObjectView,
    item: &ValueItem,
    variables: &VariableTables,
) -> Vec<ValuePart> {
    let filtered = |raw: &str| ValuePart::Literal(apply_filters(raw, &item.filters, item.prefix.as_deref()));
    match &item.kind {
        ValueKind::Name => vec![filtered(object.name())],
        ValueKind::Attribute { name, namespace } => object
            .attribute(name, namespace.as_deref())
            .map(filtered)
            .into_iter()
            .collect(),
        ValueKind::Text => vec![filtered(object.text())],
        ValueKind::TextSplit {
            delimiter,
            selection,
        } => object
            .text()
            .split(delimiter.as_str())
            .enumerate()
            .filter(|(i, _)| selection.as_ref().map_or(true, |s| s.contains(*i)))
            .map(|(_, segment)| filtered(segment))
            .collect(),
        ValueKind::Literal(text) => vec![filtered(text)],
        ValueKind::Variable {
            name,
            source_attribute,
        } => {
            let Some(raw_id) = object.attribute(source_attribute, None) else {
                return Vec::new();
            };
            let id = raw_id.strip_prefix('#').unwrap_or(raw_id);
            match variables.lookup(name, id) {
                Some(value) => vec![filtered(value)],
                None => vec![ValuePart::PendingVariable {
                    name: name.clone(),
                    id: id.to_string(),
                    filters: item.filters.clone(),
                    prefix: item.prefix.clone(),
                }],
            }
        }
    }
}

/// Alternatives an item yields for `object`, reading ancestors as configured.
pub fn compute_item(
    object: &dyn ObjectView,
    item: &ValueItem,
    stacks: &ObjectStacks<'_>,
    variables: &VariableTables,
) -> Vec<ValuePart> {
    match &item.source {
        ValueSource::OwnObject | ValueSource::Literal | ValueSource::Variable => {
            compute_value(object, item, variables)
        }
        ValueSource::Ancestor { category, distance } => resolve_ancestors(stacks, *category, *distance)
            .into_iter()
            .flat_map(|ancestor| compute_value(ancestor, item, variables))
            .collect(),
    }
}

/// Concatenate a list of items. Multi-valued items multiply the result; an
/// item yielding nothing makes the whole list yield nothing.
pub fn compute_items(
    object: &dyn ObjectView,
    items: &[ValueItem],
    stacks: &ObjectStacks<'_>,
    variables: &VariableTables,
) -> Vec<Alternative> {
    if items.is_empty() {
        return Vec::new();
    }
    let mut result: Vec<Alternative> = vec![Vec::new()];
    for item in items {
        let parts = compute_item(object, item, stacks, variables);
        if parts.is_empty() {
            return Vec::new();
        }
        result = result
            .iter()
            .flat_map(|prefix| {
                parts.iter().map(move |part| {
                    let mut alternative = prefix.clone();
                    push_part(&mut alternative, part.clone());
                    alternative
                })
            })
            .collect();
    }
    result
}

/// Append a part, merging adjacent literals.
pub fn push_part(alternative: &mut Alternative, part: ValuePart) {
    if let (Some(ValuePart::Literal(last)), ValuePart::Literal(text)) = (alternative.last_mut(), &part) {
        last.push_str(text);
        return;
    }
    alternative.push(part);
}

/// True when the alternative has nothing but delimiters.
pub fn is_empty_alternative(alternative: &Alternative) -> bool {
    alternative.iter().all(ValuePart::is_empty)
}

/// Render a fully literal alternative; `None` while a variable is pending.
pub fn literal_text(alternative: &Alternative) -> Option<String> {
    let mut out = String::new();
    for part in alternative {
        match part {
            ValuePart::Literal(text) => out.push_str(text),
            ValuePart::PendingVariable { .. } => return None,
        }
    }
    Some(out.replace(TOKEN_DELIMITER, ""))
}

// ============================================================================
// CONDITIONS
// ============================================================================

fn condition_value<'a>(object: &'a dyn ObjectView, kind: &ConditionKind) -> Option<&'a str> {
    match kind {
        ConditionKind::NameEquals => Some(object.name()),
        ConditionKind::AttributeEquals { name, namespace } => object.attribute(name, namespace.as_deref()),
        ConditionKind::TextEquals => Some(object.text()),
        ConditionKind::AncestorCountEquals { .. } | ConditionKind::UnknownAncestorCountEquals { .. } => None,
    }
}

fn matches_expected(value: Option<&str>, expected: Option<&str>) -> bool {
    match (value, expected) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(value), Some(expected)) => value == expected,
    }
}

/// Evaluate one condition; the object itself is never on the stacks here.
pub fn evaluate_condition(
    object: &ParserObject<'_>,
    condition: &Condition,
    stacks: &ObjectStacks<'_>,
) -> bool {
    let holds = match &condition.kind {
        ConditionKind::AncestorCountEquals { category, count } => stacks.depth(*category) == *count,
        ConditionKind::UnknownAncestorCountEquals { count } => object.unknown_ancestors == *count,
        kind => match &condition.target {
            ConditionTarget::OwnObject => matches_expected(
                condition_value(object, kind),
                condition.expected.as_deref(),
            ),
            // Unbounded distance: any ancestor may satisfy.
            ConditionTarget::Ancestor { category, distance } => resolve_ancestors(stacks, *category, *distance)
                .into_iter()
                .any(|ancestor| {
                    matches_expected(condition_value(ancestor, kind), condition.expected.as_deref())
                }),
        },
    };
    holds != condition.negate
}

/// Conditions of a rule that do not need the object's own text.
pub fn precheck_rule(object: &ParserObject<'_>, rule: &MappingRule, stacks: &ObjectStacks<'_>) -> bool {
    rule.conditions
        .iter()
        .filter(|c| !c.is_text())
        .all(|c| evaluate_condition(object, c, stacks))
}

/// Precheck outcome per rule, or `None` when the object should not be opened.
pub fn precheck(object: &ParserObject<'_>, stacks: &ObjectStacks<'_>) -> Option<Vec<bool>> {
    let passed: Vec<bool> = object
        .ptype
        .rules
        .iter()
        .map(|rule| precheck_rule(object, rule, stacks))
        .collect();
    (passed.is_empty() || passed.contains(&true)).then_some(passed)
}

/// All conditions of the `index`-th rule, own text conditions last.
///
/// Ancestor text is judged as it stood when the object opened, before its
/// own content was appended to the ancestor.
pub fn postcheck(object: &ParserObject<'_>, index: usize, rule: &MappingRule, stacks: &ObjectStacks<'_>) -> bool {
    let prechecked = match object.prechecked.get(index) {
        Some(passed) => *passed,
        None => precheck_rule(object, rule, stacks),
    };
    prechecked
        && (!object.ptype.precheck_text
            || rule
                .conditions
                .iter()
                .filter(|c| c.is_text())
                .all(|c| evaluate_condition(object, c, stacks)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtas_core::{Category, Filter, IndexSelection, ParserType};

    fn literal(text: &str) -> ValuePart {
        ValuePart::Literal(text.to_string())
    }

    #[test]
    fn test_text_split_selection_and_filters() {
        let w = ParserType::new("w", Category::Word);
        let object = ParserObject::new(&w).with_text("a|B|c|d");
        let item = ValueItem::own(ValueKind::TextSplit {
            delimiter: "|".to_string(),
            selection: Some(IndexSelection::parse("1-2").unwrap()),
        })
        .with_filters(vec![Filter::Lowercase])
        .with_prefix("x:");
        let values = compute_value(&object, &item, &VariableTables::new());
        assert_eq!(values, vec![literal("x:b"), literal("x:c")]);
    }

    #[test]
    fn test_items_multiply() {
        let w = ParserType::new("w", Category::Word);
        let object = ParserObject::new(&w).with_text("a b");
        let stacks = ObjectStacks::new();
        let split = ValueItem::own(ValueKind::TextSplit {
            delimiter: " ".to_string(),
            selection: None,
        });
        let items = vec![split.clone(), ValueItem::literal("-"), split];
        let values = compute_items(&object, &items, &stacks, &VariableTables::new());
        let rendered: Vec<_> = values.iter().filter_map(literal_text).collect();
        assert_eq!(rendered, vec!["a-a", "a-b", "b-a", "b-b"]);
    }

    #[test]
    fn test_missing_attribute_empties_list() {
        let w = ParserType::new("w", Category::Word);
        let object = ParserObject::new(&w);
        let items = vec![
            ValueItem::own(ValueKind::Name),
            ValueItem::own(ValueKind::Attribute {
                name: "lemma".to_string(),
                namespace: None,
            }),
        ];
        assert!(compute_items(&object, &items, &ObjectStacks::new(), &VariableTables::new()).is_empty());
    }

    #[test]
    fn test_variable_pending_then_known() {
        let w = ParserType::new("name", Category::Word);
        let object = ParserObject::new(&w).with_attribute("ref", "#p1");
        let item = ValueItem::new(
            ValueSource::Variable,
            ValueKind::Variable {
                name: "person".to_string(),
                source_attribute: "ref".to_string(),
            },
        );
        let mut variables = VariableTables::new();
        let pending = compute_value(&object, &item, &variables);
        assert!(pending[0].is_pending());
        variables.insert("person", "p1", "Anna".to_string());
        assert_eq!(compute_value(&object, &item, &variables), vec![literal("Anna")]);
    }

    #[test]
    fn test_conditions_on_ancestors() {
        let s = ParserType::new("s", Category::Group);
        let w = ParserType::new("w", Category::Word);
        let mut stacks = ObjectStacks::new();
        stacks.push(ParserObject::new(&s).with_attribute("type", "quote"));
        stacks.push(ParserObject::new(&s).with_attribute("type", "plain"));
        let object = ParserObject::new(&w);

        let any_quote = Condition {
            kind: ConditionKind::AttributeEquals {
                name: "type".to_string(),
                namespace: None,
            },
            target: ConditionTarget::Ancestor {
                category: Category::Group,
                distance: None,
            },
            expected: Some("quote".to_string()),
            negate: false,
        };
        assert!(evaluate_condition(&object, &any_quote, &stacks));

        let mut innermost_quote = any_quote.clone();
        innermost_quote.target = ConditionTarget::Ancestor {
            category: Category::Group,
            distance: Some(0),
        };
        assert!(!evaluate_condition(&object, &innermost_quote, &stacks));

        let mut missing = any_quote.clone();
        missing.target = ConditionTarget::Ancestor {
            category: Category::Relation,
            distance: None,
        };
        assert!(!evaluate_condition(&object, &missing, &stacks));
        missing.negate = true;
        assert!(evaluate_condition(&object, &missing, &stacks));

        let two_groups = Condition {
            kind: ConditionKind::AncestorCountEquals {
                category: Category::Group,
                count: 2,
            },
            target: ConditionTarget::OwnObject,
            expected: None,
            negate: false,
        };
        assert!(evaluate_condition(&object, &two_groups, &stacks));
    }

    #[test]
    fn test_text_conditions_only_at_postcheck() {
        let mut rule = MappingRule::new(Category::Word);
        rule.conditions.push(Condition {
            kind: ConditionKind::TextEquals,
            target: ConditionTarget::OwnObject,
            expected: Some("the".to_string()),
            negate: false,
        });
        let mut w = ParserType::new("w", Category::Word);
        w.add_rule(rule.clone());
        let stacks = ObjectStacks::new();
        let object = ParserObject::new(&w);
        assert!(precheck_rule(&object, &rule, &stacks));
        assert!(!postcheck(&object, 0, &rule, &stacks));
        assert!(postcheck(&object.with_text("the"), 0, &rule, &stacks));
    }

    #[test]
    fn test_ancestor_text_judged_at_open() {
        let mut s = ParserType::new("s", Category::Group);
        s.collect_text = true;
        let mut rule = MappingRule::new(Category::Word);
        rule.conditions.push(Condition {
            kind: ConditionKind::TextEquals,
            target: ConditionTarget::Ancestor {
                category: Category::Group,
                distance: Some(0),
            },
            expected: Some("x".to_string()),
            negate: false,
        });
        let mut w = ParserType::new("w", Category::Word);
        w.add_rule(rule.clone());

        let mut stacks = ObjectStacks::new();
        stacks.push(ParserObject::new(&s).with_text("x"));
        let mut object = ParserObject::new(&w);
        object.prechecked = precheck(&object, &stacks).unwrap();
        assert_eq!(object.prechecked, vec![true]);

        stacks.iter_mut().for_each(|open| open.text.push_str("Hello"));
        assert!(postcheck(&object, 0, &rule, &stacks));
        assert!(precheck(&ParserObject::new(&w), &stacks).is_none());
    }
}
