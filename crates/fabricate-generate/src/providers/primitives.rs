use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use fabricate_core::{ScalarKind, Value};
use rand::{Rng, RngCore};
use rand_regex::Regex as RandRegex;

use crate::descriptor::TypeSignature;
use crate::errors::GenerationError;
use crate::limits::{length_range, satisfies};
use crate::providers::{Provider, ProviderContext, ProviderRegistry};

const DEFAULT_INT_MIN: i64 = 0;
const DEFAULT_INT_MAX: i64 = 10000;
const DEFAULT_FLOAT_MIN: f64 = 0.0;
const DEFAULT_FLOAT_MAX: f64 = 10000.0;
const DEFAULT_TEXT_MIN: usize = 1;
const DEFAULT_TEXT_MAX: usize = 20;
const DEFAULT_BYTES_MIN: usize = 1;
const DEFAULT_BYTES_MAX: usize = 16;
const DEFAULT_MAX_REPEAT: usize = 32;
const DEFAULT_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const DATE_SPAN_DAYS: i64 = 365;

pub fn register(registry: &mut ProviderRegistry) {
    registry.register(TypeSignature::new(ScalarKind::Bool), BoolProvider);
    registry.register(
        TypeSignature::new(ScalarKind::Int),
        IntRangeProvider {
            id: "primitive.int",
            default_min: DEFAULT_INT_MIN,
            default_max: DEFAULT_INT_MAX,
        },
    );
    registry.register(
        TypeSignature::new(ScalarKind::Float),
        FloatRangeProvider {
            id: "primitive.float",
            default_min: DEFAULT_FLOAT_MIN,
            default_max: DEFAULT_FLOAT_MAX,
        },
    );
    registry.register(TypeSignature::new(ScalarKind::Text), TextProvider);
    registry.register(TypeSignature::new(ScalarKind::Bytes), BytesProvider);
    registry.register(TypeSignature::new(ScalarKind::Uuid), UuidProvider);
    registry.register(TypeSignature::new(ScalarKind::Date), DateProvider);
    registry.register(TypeSignature::new(ScalarKind::Time), TimeProvider);
    registry.register(TypeSignature::new(ScalarKind::DateTime), DateTimeProvider);

    registry.register(
        TypeSignature::tagged(ScalarKind::Int, "positive"),
        IntRangeProvider {
            id: "primitive.int.positive",
            default_min: 1,
            default_max: DEFAULT_INT_MAX,
        },
    );
    registry.register(
        TypeSignature::tagged(ScalarKind::Int, "non_negative"),
        IntRangeProvider {
            id: "primitive.int.non_negative",
            default_min: 0,
            default_max: DEFAULT_INT_MAX,
        },
    );
    registry.register(
        TypeSignature::tagged(ScalarKind::Int, "negative"),
        IntRangeProvider {
            id: "primitive.int.negative",
            default_min: -DEFAULT_INT_MAX,
            default_max: -1,
        },
    );
    registry.register(
        TypeSignature::tagged(ScalarKind::Float, "positive"),
        FloatRangeProvider {
            id: "primitive.float.positive",
            default_min: f64::MIN_POSITIVE,
            default_max: DEFAULT_FLOAT_MAX,
        },
    );
    registry.register(
        TypeSignature::tagged(ScalarKind::Float, "probability"),
        FloatRangeProvider {
            id: "primitive.float.probability",
            default_min: 0.0,
            default_max: 1.0,
        },
    );
}

struct BoolProvider;

impl Provider for BoolProvider {
    fn id(&self) -> &str {
        "primitive.bool"
    }

    fn generate(
        &self,
        _ctx: &ProviderContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, GenerationError> {
        Ok(Value::Bool(rng.random_bool(0.5)))
    }
}

/// Numeric window from declared bounds layered over a default range. A lone
/// bound outside the default range shifts the window so it stays non-empty.
fn numeric_window(
    minimum: Option<f64>,
    maximum: Option<f64>,
    default_min: f64,
    default_max: f64,
) -> (f64, f64) {
    let span = default_max - default_min;
    match (minimum, maximum) {
        (Some(min), Some(max)) => (min, max),
        (Some(min), None) if min <= default_max => (min.max(default_min), default_max),
        (Some(min), None) => (min, min + span),
        (None, Some(max)) if max >= default_min => (default_min, max.min(default_max)),
        (None, Some(max)) => (max - span, max),
        (None, None) => (default_min, default_max),
    }
}

struct IntRangeProvider {
    id: &'static str,
    default_min: i64,
    default_max: i64,
}

impl Provider for IntRangeProvider {
    fn id(&self) -> &str {
        self.id
    }

    fn generate(
        &self,
        ctx: &ProviderContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, GenerationError> {
        let (min, max) = numeric_window(
            ctx.constraints.minimum,
            ctx.constraints.maximum,
            self.default_min as f64,
            self.default_max as f64,
        );
        let min = clamp_to_i64(min.ceil());
        let max = clamp_to_i64(max.floor());
        if min > max {
            return Err(GenerationError::unsatisfiable(
                ctx.path,
                format!("no integer lies within [{min}, {max}]"),
            ));
        }
        Ok(Value::Int(rng.random_range(min..=max)))
    }
}

fn clamp_to_i64(value: f64) -> i64 {
    if value >= i64::MAX as f64 {
        i64::MAX
    } else if value <= i64::MIN as f64 {
        i64::MIN
    } else {
        value as i64
    }
}

struct FloatRangeProvider {
    id: &'static str,
    default_min: f64,
    default_max: f64,
}

impl Provider for FloatRangeProvider {
    fn id(&self) -> &str {
        self.id
    }

    fn generate(
        &self,
        ctx: &ProviderContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, GenerationError> {
        let (min, max) = numeric_window(
            ctx.constraints.minimum,
            ctx.constraints.maximum,
            self.default_min,
            self.default_max,
        );
        if min > max || !min.is_finite() || !max.is_finite() {
            return Err(GenerationError::unsatisfiable(
                ctx.path,
                format!("empty float range [{min}, {max}]"),
            ));
        }
        Ok(Value::Float(sample_float(min, max, rng)))
    }
}

/// Uniform draw from `[min, max]`. Spans wider than `f64::MAX` are sampled
/// on halved bounds and scaled back.
fn sample_float(min: f64, max: f64, rng: &mut dyn RngCore) -> f64 {
    if (max - min).is_finite() {
        return rng.random_range(min..=max);
    }
    let (half_min, half_max) = (min / 2.0, max / 2.0);
    let unit: f64 = rng.random_range(0.0..=1.0);
    ((half_min + unit * (half_max - half_min)) * 2.0).clamp(min, max)
}

struct TextProvider;

impl Provider for TextProvider {
    fn id(&self) -> &str {
        "primitive.str"
    }

    fn generate(
        &self,
        ctx: &ProviderContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, GenerationError> {
        let range = length_range(ctx.constraints, DEFAULT_TEXT_MIN, DEFAULT_TEXT_MAX, ctx.path)?;

        let Some(pattern) = &ctx.constraints.pattern else {
            let len = rng.random_range(range.min..=range.max);
            let value = (0..len)
                .map(|_| char::from(DEFAULT_CHARSET[rng.random_range(0..DEFAULT_CHARSET.len())]))
                .collect::<String>();
            return Ok(Value::Text(value));
        };

        let min_length = ctx.constraints.min_length.unwrap_or(0);
        let max_repeat = ctx
            .constraints
            .max_length
            .unwrap_or_else(|| DEFAULT_MAX_REPEAT.max(min_length.saturating_mul(2)));
        let max_repeat = u32::try_from(max_repeat).unwrap_or(u32::MAX);
        let regex = RandRegex::compile(sampling_pattern(pattern), max_repeat).map_err(|err| {
            GenerationError::unsatisfiable(ctx.path, format!("invalid regex pattern: {err}"))
        })?;
        for _ in 0..ctx.max_attempts.max(1) {
            let value: String = rng.sample(&regex);
            let value = Value::Text(value);
            if satisfies(&value, ctx.constraints) {
                return Ok(value);
            }
        }
        Err(GenerationError::unsatisfiable(
            ctx.path,
            format!(
                "no text matching '{pattern}' within the length bounds after {} attempts",
                ctx.max_attempts.max(1)
            ),
        ))
    }
}

/// `pattern` without a leading `^` or unescaped trailing `$`, which
/// `rand_regex` cannot sample. Results are checked against the original.
fn sampling_pattern(pattern: &str) -> &str {
    let pattern = pattern.strip_prefix('^').unwrap_or(pattern);
    match pattern.strip_suffix('$') {
        Some(body) if body.chars().rev().take_while(|&ch| ch == '\\').count() % 2 == 0 => body,
        _ => pattern,
    }
}

struct BytesProvider;

impl Provider for BytesProvider {
    fn id(&self) -> &str {
        "primitive.bytes"
    }

    fn generate(
        &self,
        ctx: &ProviderContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, GenerationError> {
        let range = length_range(ctx.constraints, DEFAULT_BYTES_MIN, DEFAULT_BYTES_MAX, ctx.path)?;
        let mut bytes = vec![0_u8; rng.random_range(range.min..=range.max)];
        rng.fill_bytes(&mut bytes);
        Ok(Value::Bytes(bytes))
    }
}

struct UuidProvider;

impl Provider for UuidProvider {
    fn id(&self) -> &str {
        "primitive.uuid"
    }

    fn generate(
        &self,
        _ctx: &ProviderContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, GenerationError> {
        let mut bytes = [0_u8; 16];
        rng.fill_bytes(&mut bytes);
        bytes[6] = (bytes[6] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        Ok(Value::Uuid(uuid::Uuid::from_bytes(bytes)))
    }
}

// Fixed base instead of the wall clock so seeded builds are reproducible.
fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default()
}

struct DateProvider;

impl Provider for DateProvider {
    fn id(&self) -> &str {
        "primitive.date"
    }

    fn generate(
        &self,
        _ctx: &ProviderContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, GenerationError> {
        let offset = rng.random_range(0..=DATE_SPAN_DAYS);
        Ok(Value::Date(base_date() + Duration::days(offset)))
    }
}

struct TimeProvider;

impl Provider for TimeProvider {
    fn id(&self) -> &str {
        "primitive.time"
    }

    fn generate(
        &self,
        _ctx: &ProviderContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, GenerationError> {
        let seconds = rng.random_range(0..86_400_u32);
        let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).unwrap_or_default();
        Ok(Value::Time(time))
    }
}

struct DateTimeProvider;

impl Provider for DateTimeProvider {
    fn id(&self) -> &str {
        "primitive.datetime"
    }

    fn generate(
        &self,
        _ctx: &ProviderContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, GenerationError> {
        let start = NaiveDateTime::new(base_date(), NaiveTime::default());
        let offset = rng.random_range(0..=DATE_SPAN_DAYS * 86_400);
        Ok(Value::DateTime(start + Duration::seconds(offset)))
    }
}
