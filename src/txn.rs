use serde::{Serialize, Deserialize};

/// Opaque transaction payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Txn(pub Vec<u8>);

impl Txn {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Txn {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for Txn {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

/// Transactions received but not yet committed by a notarized block, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pool {
    txns: Vec<Txn>
}

impl Pool {
    pub fn push(&mut self, txn: Txn) {
        self.txns.push(txn);
    }

    pub fn txns(&self) -> &[Txn] {
        &self.txns
    }

    pub fn len(&self) -> usize {
        self.txns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txns.is_empty()
    }

    // Removes one occurrence per committed txn. Whatever could not be found
    // comes back as the error; everything else is still removed.
    pub fn commit(&mut self, committed: &[Txn]) -> Result<(), Vec<Txn>> {
        let mut missing = Vec::default();
        for txn in committed {
            match self.txns.iter().position(|t| t == txn) {
                Some(idx) => { self.txns.remove(idx); },
                None => missing.push(txn.clone())
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn commit_once() {
        let mut pool = Pool::default();
        pool.push(Txn::from("t1"));
        pool.push(Txn::from("t2"));
        assert_eq!(pool.commit(&[Txn::from("t1")]), Ok(()));
        assert_eq!(pool.txns(), &[Txn::from("t2")]);
        assert_eq!(pool.commit(&[Txn::from("t1")]), Err(vec![Txn::from("t1")]));
    }

    #[test]
    fn commit_partial() {
        let mut pool = Pool::default();
        pool.push(Txn::from("t1"));
        pool.push(Txn::from("t2"));
        assert_eq!(
            pool.commit(&[Txn::from("t2"), Txn::from("t3")]),
            Err(vec![Txn::from("t3")])
        );
        assert_eq!(pool.txns(), &[Txn::from("t1")]);
    }

    #[test]
    fn commit_duplicates() {
        let mut pool = Pool::default();
        pool.push(Txn::from("t1"));
        pool.push(Txn::from("t1"));
        assert_eq!(pool.commit(&[Txn::from("t1")]), Ok(()));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.commit(&[Txn::from("t1"), Txn::from("t1")]), Err(vec![Txn::from("t1")]));
        assert!(pool.is_empty());
    }
}
