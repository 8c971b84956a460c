//! Content compiled into the binary, used when no vendored copy exists

pub const SCHEMA: &str = include_str!("../../assets/schema/snowfakery_recipe.jsonschema.json");

pub const PROVIDERS: &str = include_str!("../../assets/providers.json");

/// (relative path, text)
pub const DOCS: &[(&str, &str)] = &[
    ("arch/ArchIndex.md", include_str!("../../assets/docs/arch/ArchIndex.md")),
    ("embedding.md", include_str!("../../assets/docs/embedding.md")),
    ("extending.md", include_str!("../../assets/docs/extending.md")),
    ("index.md", include_str!("../../assets/docs/index.md")),
    ("salesforce.md", include_str!("../../assets/docs/salesforce.md")),
];

pub const EXAMPLES: &[(&str, &str)] = &[
    ("company.yml", include_str!("../../assets/examples/company.yml")),
    ("counters.yml", include_str!("../../assets/examples/counters.yml")),
    ("just_once.yml", include_str!("../../assets/examples/just_once.yml")),
    ("macros.yml", include_str!("../../assets/examples/macros.yml")),
    ("options.yml", include_str!("../../assets/examples/options.yml")),
    ("person.yml", include_str!("../../assets/examples/person.yml")),
    ("random_reference.yml", include_str!("../../assets/examples/random_reference.yml")),
    (
        "salesforce/person_accounts.recipe.yml",
        include_str!("../../assets/examples/salesforce/person_accounts.recipe.yml"),
    ),
    (
        "salesforce/simple_account.recipe.yml",
        include_str!("../../assets/examples/salesforce/simple_account.recipe.yml"),
    ),
];
