use crate::eap_type::EapType;

/// Ordered, duplicate-free list of EAP types permitted by policy, with the
/// read cursor used while answering Naks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AcceptTypes {
    types: Vec<EapType>,
    cursor: usize,
}

impl AcceptTypes {
    pub fn new(types: impl IntoIterator<Item = EapType>) -> Self {
        let mut list: Vec<EapType> = Vec::new();
        for t in types {
            if !t.is_reserved() && !list.contains(&t) {
                list.push(t);
            }
        }
        AcceptTypes { types: list, cursor: 0 }
    }

    pub fn types(&self) -> &[EapType] {
        &self.types
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn contains(&self, eap_type: EapType) -> bool {
        self.types.contains(&eap_type)
    }

    /// True iff every accepted type tunnels its inner authentication.
    pub fn use_outer_identity(&self) -> bool {
        !self.types.is_empty() && self.types.iter().all(|t| t.is_tunnel())
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    /// Moves the cursor forward one slot. Returns false once the list has
    /// been walked completely.
    pub fn advance(&mut self) -> bool {
        if self.cursor >= self.types.len() {
            return false;
        }
        self.cursor += 1;
        true
    }

    pub fn retain(&mut self, mut keep: impl FnMut(EapType) -> bool) {
        self.types.retain(|t| keep(*t));
        self.cursor = self.cursor.min(self.types.len());
    }
}
