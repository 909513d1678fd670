use crate::markword::MarkSections;
use crate::object::Object;
use crate::thread::JavaThread;

/// How a biased acquisition was granted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BiasGrant {
    /// Already biased toward the caller in the current epoch. Nothing was written.
    Existing,
    /// The bias belonged to an expired epoch and was taken over.
    Rebiased,
    /// The header was anonymously biased and the caller installed itself.
    Anonymous,
}

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BiasedOutcome {
    Owned(BiasGrant),
    Contended,
    /// The header does not carry the bias pattern.
    NotApplicable,
    /// The class stopped being biasable. The stale bias was stripped from the header, by this call or a
    /// racing one, and the caller continues with a stack lock.
    Revoked,
}

/// Try to acquire `obj` through its bias.
///
/// The header is compared against the class prototype combined with the caller's token, ignoring the
/// age. The first differing field decides the outcome: a missing bias pattern on the prototype means
/// the class was revoked, a differing epoch means the bias expired, and anything else means the bias
/// belongs to someone. Only an anonymous bias can be claimed in the last case.
pub fn try_biased_acquire(obj: &Object, thread: &JavaThread) -> BiasedOutcome {
    let mark = obj.mark();
    if !mark.has_bias_pattern() {
        return BiasedOutcome::NotApplicable;
    }

    // Read once. A bulk rebias may move the epoch between two reads.
    let prototype = obj.klass().prototype_header();
    let token = thread.token();

    let diff = (mark.raw() ^ (prototype.raw() | token.raw())) & !MarkSections::AGE.bits();
    if diff == 0 {
        return BiasedOutcome::Owned(BiasGrant::Existing);
    }

    if diff & MarkSections::BIAS_PATTERN.bits() != 0 {
        let _ = obj.cas_mark(mark, prototype.with_age(mark.age()));
        return BiasedOutcome::Revoked;
    }

    if diff & MarkSections::EPOCH.bits() != 0 {
        let rebiased = prototype.with_age(mark.age()).with_biased_owner(Some(token));
        return match obj.cas_mark(mark, rebiased) {
            Ok(_) => BiasedOutcome::Owned(BiasGrant::Rebiased),
            Err(_) => BiasedOutcome::Contended,
        };
    }

    // Same epoch, different owner. Only succeeds if the header is anonymous.
    let anonymous = mark.with_biased_owner(None);
    match obj.cas_mark(anonymous, anonymous.with_biased_owner(Some(token))) {
        Ok(_) => BiasedOutcome::Owned(BiasGrant::Anonymous),
        Err(_) => BiasedOutcome::Contended,
    }
}

#[cfg(test)]
mod test {
    use super::{try_biased_acquire, BiasGrant, BiasedOutcome};
    use crate::markword::MarkWord;
    use crate::object::{Klass, Object};
    use crate::thread::{JavaThread, ThreadToken};

    fn foreign() -> ThreadToken {
        ThreadToken::from_raw(0x7ff0_0000_0400).unwrap()
    }

    #[test]
    pub fn anonymous_bias_is_claimed() {
        let thread = JavaThread::attach("anonymous").unwrap();
        let klass = Klass::new("Anonymous", true);
        let obj = Object::with_mark(&klass, MarkWord::biased_prototype(0).with_age(5));

        assert_eq!(try_biased_acquire(&obj, &thread), BiasedOutcome::Owned(BiasGrant::Anonymous));
        assert_eq!(obj.mark(), MarkWord::encode_biased(Some(thread.token()), 0, 5));

        // Second acquisition writes nothing
        assert_eq!(try_biased_acquire(&obj, &thread), BiasedOutcome::Owned(BiasGrant::Existing));
        assert_eq!(obj.mark(), MarkWord::encode_biased(Some(thread.token()), 0, 5));
    }

    #[test]
    pub fn foreign_bias_contends() {
        let thread = JavaThread::attach("foreign").unwrap();
        let klass = Klass::new("Foreign", true);
        let mark = MarkWord::encode_biased(Some(foreign()), 0, 0);
        let obj = Object::with_mark(&klass, mark);

        assert_eq!(try_biased_acquire(&obj, &thread), BiasedOutcome::Contended);
        assert_eq!(obj.mark(), mark);
    }

    #[test]
    pub fn expired_epoch_is_rebiased() {
        let thread = JavaThread::attach("rebias").unwrap();
        let klass = Klass::new("Rebias", true);
        klass.set_prototype_header(MarkWord::biased_prototype(2));

        let obj = Object::with_mark(&klass, MarkWord::encode_biased(Some(foreign()), 1, 3));
        assert_eq!(try_biased_acquire(&obj, &thread), BiasedOutcome::Owned(BiasGrant::Rebiased));
        assert_eq!(obj.mark(), MarkWord::encode_biased(Some(thread.token()), 2, 3));
    }

    #[test]
    pub fn own_bias_in_expired_epoch_is_not_reused() {
        let thread = JavaThread::attach("stale").unwrap();
        let klass = Klass::new("Stale", true);
        let obj = Object::with_mark(&klass, MarkWord::encode_biased(Some(thread.token()), 0, 0));
        klass.set_prototype_header(MarkWord::biased_prototype(1));

        assert_eq!(try_biased_acquire(&obj, &thread), BiasedOutcome::Owned(BiasGrant::Rebiased));
        assert_eq!(obj.mark().bias_epoch(), 1);
    }

    #[test]
    pub fn revoked_class_strips_bias() {
        let thread = JavaThread::attach("revoked").unwrap();
        let klass = Klass::new("Revoked", false);
        let obj = Object::with_mark(&klass, MarkWord::encode_biased(Some(foreign()), 0, 7));

        assert_eq!(try_biased_acquire(&obj, &thread), BiasedOutcome::Revoked);
        assert_eq!(obj.mark(), MarkWord::prototype().with_age(7));
    }

    #[test]
    pub fn unbiased_header_is_skipped() {
        let thread = JavaThread::attach("neutral").unwrap();
        let klass = Klass::new("Neutral", true);
        let obj = Object::with_mark(&klass, MarkWord::prototype());

        assert_eq!(try_biased_acquire(&obj, &thread), BiasedOutcome::NotApplicable);
        assert_eq!(obj.mark(), MarkWord::prototype());
    }
}
