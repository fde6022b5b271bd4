use fabricate_core::{ScalarKind, Value};
use fake::Fake;
use fake::locales::{EN, PT_BR};
use rand::RngCore;
use tracing::warn;

use crate::descriptor::TypeSignature;
use crate::errors::GenerationError;
use crate::faker_rs::locales::LocaleKey;
use crate::limits::satisfies;
use crate::providers::{Provider, ProviderContext, ProviderRegistry};

/// Draw one value from a raw fake faker in the requested locale.
macro_rules! localized {
    ($locale:expr, $rng:expr, $($segment:ident)::+ $(, $arg:expr)*) => {{
        let value: String = match $locale {
            LocaleKey::EnUs => $($segment)::+(EN $(, $arg)*).fake_with_rng($rng),
            LocaleKey::PtBr => $($segment)::+(PT_BR $(, $arg)*).fake_with_rng($rng),
        };
        value
    }};
}

type Draw = fn(LocaleKey, &mut dyn RngCore) -> String;

const SEMANTIC_TEXT: &[(&str, &str, Draw)] = &[
    ("email", "semantic.email", email),
    ("name", "semantic.name", name),
    ("first_name", "semantic.first_name", first_name),
    ("last_name", "semantic.last_name", last_name),
    ("username", "semantic.username", username),
    ("phone", "semantic.phone", phone),
    ("city", "semantic.city", city),
    ("country", "semantic.country", country),
    ("street", "semantic.street", street),
    ("zip_code", "semantic.zip_code", zip_code),
    ("company", "semantic.company", company),
    ("word", "semantic.word", word),
    ("sentence", "semantic.sentence", sentence),
    ("paragraph", "semantic.paragraph", paragraph),
    ("url", "semantic.url", url),
    ("ipv4", "semantic.ipv4", ipv4),
];

/// Tags without a provider of their own, answered by a broader category.
const CATEGORY_EDGES: &[(ScalarKind, &str, &str)] = &[
    (ScalarKind::Int, "age", "non_negative"),
    (ScalarKind::Float, "price", "positive"),
    (ScalarKind::Text, "slug", "word"),
    (ScalarKind::Text, "first_name", "name"),
    (ScalarKind::Text, "last_name", "name"),
];

pub fn register(registry: &mut ProviderRegistry) {
    for &(tag, id, draw) in SEMANTIC_TEXT {
        registry.register(
            TypeSignature::tagged(ScalarKind::Text, tag),
            FakeTextProvider { id, draw },
        );
    }
    for &(kind, child, parent) in CATEGORY_EDGES {
        if let Err(err) = registry.register_category(
            TypeSignature::tagged(kind, child),
            TypeSignature::tagged(kind, parent),
        ) {
            warn!(child = %child, parent = %parent, error = %err, "built-in category rejected");
        }
    }
}

/// Semantic text provider re-drawing until declared length and pattern hold.
struct FakeTextProvider {
    id: &'static str,
    draw: Draw,
}

impl Provider for FakeTextProvider {
    fn id(&self) -> &str {
        self.id
    }

    fn generate(
        &self,
        ctx: &ProviderContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, GenerationError> {
        let attempts = ctx.max_attempts.max(1);
        for _ in 0..attempts {
            let value = Value::Text((self.draw)(ctx.locale, rng));
            if satisfies(&value, ctx.constraints) {
                return Ok(value);
            }
        }
        Err(GenerationError::unsatisfiable(
            ctx.path,
            format!(
                "{} produced no value within the declared constraints after {attempts} attempts",
                self.id
            ),
        ))
    }
}

fn email(locale: LocaleKey, rng: &mut dyn RngCore) -> String {
    localized!(locale, rng, fake::faker::internet::raw::SafeEmail)
}

fn name(locale: LocaleKey, rng: &mut dyn RngCore) -> String {
    localized!(locale, rng, fake::faker::name::raw::Name)
}

fn first_name(locale: LocaleKey, rng: &mut dyn RngCore) -> String {
    localized!(locale, rng, fake::faker::name::raw::FirstName)
}

fn last_name(locale: LocaleKey, rng: &mut dyn RngCore) -> String {
    localized!(locale, rng, fake::faker::name::raw::LastName)
}

fn username(locale: LocaleKey, rng: &mut dyn RngCore) -> String {
    localized!(locale, rng, fake::faker::internet::raw::Username)
}

fn phone(locale: LocaleKey, rng: &mut dyn RngCore) -> String {
    localized!(locale, rng, fake::faker::phone_number::raw::PhoneNumber)
}

fn city(locale: LocaleKey, rng: &mut dyn RngCore) -> String {
    localized!(locale, rng, fake::faker::address::raw::CityName)
}

fn country(locale: LocaleKey, rng: &mut dyn RngCore) -> String {
    localized!(locale, rng, fake::faker::address::raw::CountryName)
}

fn street(locale: LocaleKey, rng: &mut dyn RngCore) -> String {
    localized!(locale, rng, fake::faker::address::raw::StreetName)
}

fn zip_code(locale: LocaleKey, rng: &mut dyn RngCore) -> String {
    localized!(locale, rng, fake::faker::address::raw::ZipCode)
}

fn company(locale: LocaleKey, rng: &mut dyn RngCore) -> String {
    localized!(locale, rng, fake::faker::company::raw::CompanyName)
}

fn word(locale: LocaleKey, rng: &mut dyn RngCore) -> String {
    localized!(locale, rng, fake::faker::lorem::raw::Word)
}

fn sentence(locale: LocaleKey, rng: &mut dyn RngCore) -> String {
    localized!(locale, rng, fake::faker::lorem::raw::Sentence, 3..8)
}

fn paragraph(locale: LocaleKey, rng: &mut dyn RngCore) -> String {
    localized!(locale, rng, fake::faker::lorem::raw::Paragraph, 1..3)
}

fn url(locale: LocaleKey, rng: &mut dyn RngCore) -> String {
    let host = word(locale, rng).to_lowercase();
    let suffix = localized!(locale, rng, fake::faker::internet::raw::DomainSuffix);
    format!("https://www.{host}.{suffix}")
}

fn ipv4(locale: LocaleKey, rng: &mut dyn RngCore) -> String {
    localized!(locale, rng, fake::faker::internet::raw::IPv4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabricate_core::Constraints;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn generate(
        tag: &str,
        locale: LocaleKey,
        constraints: &Constraints,
        seed: u64,
    ) -> Result<Value, GenerationError> {
        let mut registry = ProviderRegistry::new();
        register(&mut registry);
        let signature = TypeSignature::tagged(ScalarKind::Text, tag);
        let found = registry.lookup(&signature, constraints).expect("lookup");
        let ctx = ProviderContext {
            signature: &signature,
            constraints,
            path: "field",
            locale,
            max_attempts: 64,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        found.provider.generate(&ctx, &mut rng)
    }

    #[test]
    fn every_semantic_tag_yields_text_in_both_locales() {
        for &(tag, _, _) in SEMANTIC_TEXT {
            for locale in [LocaleKey::EnUs, LocaleKey::PtBr] {
                let value = generate(tag, locale, &Constraints::default(), 5).expect("value");
                let text = value.as_str().expect("text");
                assert!(!text.is_empty(), "{tag} in {locale}");
            }
        }
    }

    #[test]
    fn emails_and_urls_have_their_shape() {
        let email = generate("email", LocaleKey::EnUs, &Constraints::default(), 1).expect("email");
        assert!(email.as_str().expect("text").contains('@'));
        let url = generate("url", LocaleKey::EnUs, &Constraints::default(), 1).expect("url");
        assert!(url.as_str().expect("text").starts_with("https://www."));
    }

    #[test]
    fn redraws_until_the_length_bound_holds() {
        let constraints = Constraints::max_length(6);
        for seed in 0..8 {
            let value = generate("word", LocaleKey::EnUs, &constraints, seed).expect("word");
            assert!(value.length().expect("len") <= 6);
        }
    }

    #[test]
    fn impossible_bounds_fail_after_the_retry_budget() {
        let err = generate("email", LocaleKey::EnUs, &Constraints::max_length(2), 3)
            .expect_err("too short");
        assert!(matches!(err, GenerationError::UnsatisfiableConstraint { .. }));
    }

    #[test]
    fn every_built_in_category_edge_is_registered() {
        let registry = ProviderRegistry::with_builtins();
        for &(kind, child, parent) in CATEGORY_EDGES {
            let chain = registry.fallback_chain(&TypeSignature::tagged(kind, child));
            assert_eq!(
                chain.get(1).map(|(signature, _)| signature),
                Some(&TypeSignature::tagged(kind, parent))
            );
        }
        assert_eq!(registry.categories().count(), CATEGORY_EDGES.len());
    }

    #[test]
    fn fallback_only_tags_reach_a_broader_provider() {
        let mut registry = ProviderRegistry::new();
        register(&mut registry);
        let slug = TypeSignature::tagged(ScalarKind::Text, "slug");
        let found = registry
            .lookup(&slug, &Constraints::default())
            .expect("lookup");
        assert_eq!(found.provider.id(), "semantic.word");
        assert!(found.fallback);
    }
}
