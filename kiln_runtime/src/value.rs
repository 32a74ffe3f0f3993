use kiln_types::{BaseType, MemberDesc};
use num_traits::NumCast;

use crate::class;
use crate::error::{fail, Result, RtError};
use crate::object::ObjectRef;

/// A member value, tagged by base type. Stands in for raw member storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Byte(i8),
    UByte(u8),
    Short(i16),
    UShort(u16),
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Float(f32),
    Double(f64),
    Str(String),
    Object(ObjectRef),
    /// Fields of an embedded record, in the record class's member order.
    Record(Vec<Value>),
    Array(Vec<Value>),
}

impl Value {
    pub fn zero_scalar(base: BaseType) -> Value {
        match base {
            BaseType::Byte => Value::Byte(0),
            BaseType::UByte => Value::UByte(0),
            BaseType::Short => Value::Short(0),
            BaseType::UShort => Value::UShort(0),
            BaseType::Int => Value::Int(0),
            BaseType::UInt => Value::UInt(0),
            BaseType::Long => Value::Long(0),
            BaseType::ULong => Value::ULong(0),
            BaseType::Float => Value::Float(0.0),
            BaseType::Double => Value::Double(0.0),
            BaseType::String => Value::Str(String::new()),
            BaseType::Object => Value::Object(ObjectRef::null()),
            BaseType::Struct | BaseType::Void | BaseType::Op | BaseType::Method => Value::Void,
        }
    }

    /// Zero value for one element of `member`.
    pub fn zero_element(member: &MemberDesc) -> Value {
        match member.code.base {
            BaseType::Struct => {
                let record = member.record.as_deref().and_then(class::lookup_class);
                match record {
                    Some(record) => Value::Record(
                        record.members().iter().map(Value::zero).collect(),
                    ),
                    None => Value::Record(Vec::new()),
                }
            }
            base => Value::zero_scalar(base),
        }
    }

    pub fn zero(member: &MemberDesc) -> Value {
        if is_sequence(member) {
            Value::Array(vec![Value::zero_element(member); member.max_elements()])
        } else {
            Value::zero_element(member)
        }
    }

    /// Parses a scalar token as `base`, rejecting values out of the type's range.
    pub fn parse_scalar(base: BaseType, text: &str) -> Option<Value> {
        match base {
            BaseType::Float => text.parse::<f64>().ok().map(|f| Value::Float(f as f32)),
            BaseType::Double => text.parse::<f64>().ok().map(Value::Double),
            BaseType::ULong => match text.parse::<u64>() {
                Ok(n) => Some(Value::ULong(n)),
                Err(_) => Value::from_number(base, parse_float_int(text)?),
            },
            base if base.is_integer() => match text.parse::<i64>() {
                Ok(n) => Value::from_number(base, n),
                Err(_) => Value::from_number(base, parse_float_int(text)?),
            },
            _ => None,
        }
    }

    /// Converts `n` to a value of `base`, if it fits.
    pub fn from_number<N: NumCast + Copy>(base: BaseType, n: N) -> Option<Value> {
        Some(match base {
            BaseType::Byte => Value::Byte(NumCast::from(n)?),
            BaseType::UByte => Value::UByte(NumCast::from(n)?),
            BaseType::Short => Value::Short(NumCast::from(n)?),
            BaseType::UShort => Value::UShort(NumCast::from(n)?),
            BaseType::Int => Value::Int(NumCast::from(n)?),
            BaseType::UInt => Value::UInt(NumCast::from(n)?),
            BaseType::Long => Value::Long(NumCast::from(n)?),
            BaseType::ULong => Value::ULong(NumCast::from(n)?),
            BaseType::Float => Value::Float(NumCast::from(n)?),
            BaseType::Double => Value::Double(NumCast::from(n)?),
            _ => return None,
        })
    }

    /// The numeric payload converted to `T`, if this is a number and it fits.
    pub fn to_number<T: NumCast>(&self) -> Option<T> {
        match *self {
            Value::Byte(n) => NumCast::from(n),
            Value::UByte(n) => NumCast::from(n),
            Value::Short(n) => NumCast::from(n),
            Value::UShort(n) => NumCast::from(n),
            Value::Int(n) => NumCast::from(n),
            Value::UInt(n) => NumCast::from(n),
            Value::Long(n) => NumCast::from(n),
            Value::ULong(n) => NumCast::from(n),
            Value::Float(n) => NumCast::from(n),
            Value::Double(n) => NumCast::from(n),
            _ => None,
        }
    }

    pub fn base_type(&self) -> Option<BaseType> {
        Some(match self {
            Value::Void => BaseType::Void,
            Value::Byte(_) => BaseType::Byte,
            Value::UByte(_) => BaseType::UByte,
            Value::Short(_) => BaseType::Short,
            Value::UShort(_) => BaseType::UShort,
            Value::Int(_) => BaseType::Int,
            Value::UInt(_) => BaseType::UInt,
            Value::Long(_) => BaseType::Long,
            Value::ULong(_) => BaseType::ULong,
            Value::Float(_) => BaseType::Float,
            Value::Double(_) => BaseType::Double,
            Value::Str(_) => BaseType::String,
            Value::Object(_) => BaseType::Object,
            Value::Record(_) => BaseType::Struct,
            Value::Array(_) => return None,
        })
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Float(_) | Value::Double(_) => None,
            v => v.to_number(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.to_number()
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Visits every object reference held in this value, nested ones included.
    pub fn for_each_object(&self, f: &mut impl FnMut(&ObjectRef)) {
        match self {
            Value::Object(o) => f(o),
            Value::Record(vals) | Value::Array(vals) => {
                for v in vals {
                    v.for_each_object(f);
                }
            }
            _ => {}
        }
    }

    pub fn keep_objects(&self) {
        self.for_each_object(&mut |o| o.keep());
    }

    pub fn release_objects(&self) {
        self.for_each_object(&mut |o| o.release());
    }

    /// Checks that this value fits `member`, capacity included.
    pub fn check(&self, member: &MemberDesc) -> Result<()> {
        if is_sequence(member) {
            let vals = match self {
                Value::Array(vals) => vals,
                _ => return fail(mismatch(member, self)),
            };
            if vals.len() > member.max_elements() {
                return fail(RtError::bad_param(format!(
                    "data would overrun object end in {}",
                    member.name
                )));
            }
            return vals.iter().try_for_each(|v| check_element(member, v, true));
        }
        check_element(member, self, false)
    }
}

/// Whether `member` holds several elements rather than one.
pub(crate) fn is_sequence(member: &MemberDesc) -> bool {
    member.code.is_array() || (member.count > 1 && !member.code.is_inline_string())
}

fn parse_float_int(text: &str) -> Option<f64> {
    let f = text.parse::<f64>().ok()?;
    if f.is_finite() {
        Some(f.trunc())
    } else {
        None
    }
}

fn check_element(member: &MemberDesc, value: &Value, in_array: bool) -> Result<()> {
    match (member.code.base, value) {
        (BaseType::String, Value::Str(s)) => {
            // inline strings carry a terminator within the member's capacity
            if !in_array && member.code.is_inline_string() && s.len() + 1 > member.count as usize {
                return fail(RtError::bad_param(format!(
                    "string would overrun object end in {}",
                    member.name
                )));
            }
            Ok(())
        }
        (BaseType::Struct, Value::Record(vals)) => {
            let record = member.record.as_deref().and_then(class::lookup_class);
            match record {
                Some(record) if record.members().len() == vals.len() => record
                    .members()
                    .iter()
                    .zip(vals)
                    .try_for_each(|(m, v)| v.check(m)),
                _ => fail(mismatch(member, value)),
            }
        }
        (base, v) if v.base_type() == Some(base) => Ok(()),
        _ => fail(mismatch(member, value)),
    }
}

fn mismatch(member: &MemberDesc, value: &Value) -> RtError {
    RtError::bad_param(format!(
        "member {} of type {} cannot hold {:?}",
        member.name, member.code, value
    ))
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Value::Object(o)
    }
}
